#![no_std]
#![no_main]

#[path = "../src/tlv493d.rs"]
mod tlv493d;

#[path = "../src/report.rs"]
mod report;

use {defmt_rtt as _, panic_probe as _};

use crate::tlv493d::SAMPLE_FRAME_LEN;

// Inverse of the decoder's bit-packing: 12-bit two's complement values
// spread over the MSB registers 0-3 and the LSB nibbles in 4-6.
fn pack_frame(x: i16, y: i16, z: i16, t: i16) -> [u8; SAMPLE_FRAME_LEN] {
    let x = x as u16 & 0x0FFF;
    let y = y as u16 & 0x0FFF;
    let z = z as u16 & 0x0FFF;
    let t = t as u16 & 0x0FFF;
    [
        (x >> 4) as u8,
        (y >> 4) as u8,
        (z >> 4) as u8,
        ((t >> 8) as u8) << 4,
        (((x & 0x0F) as u8) << 4) | (y & 0x0F) as u8,
        (z & 0x0F) as u8,
        (t & 0xFF) as u8,
    ]
}

#[defmt_test::tests]
mod tests {
    use defmt::{assert, assert_eq};
    use num_traits::float::Float;

    use super::pack_frame;
    use crate::report::{format_row, header_due, HEADER_EVERY};
    use crate::tlv493d::{
        build_config_frame, decode_sample, PowerMode, Sample, REGISTER_IMAGE_LEN,
    };

    #[test]
    fn decodes_every_12bit_value_in_range() {
        for raw in 0u16..4096 {
            let expected = if raw < 2048 {
                raw as i16
            } else {
                raw as i16 - 4096
            };
            let frame = pack_frame(expected, 0, 0, 0);
            let sample = decode_sample(&frame);
            assert_eq!(sample.x, expected);
            assert!(sample.x >= -2048 && sample.x <= 2047);
        }
    }

    #[test]
    fn sign_rule_is_shared_by_all_channels() {
        for raw in [0u16, 1, 1023, 1024, 2047, 2048, 3071, 4095] {
            let expected = if raw < 2048 {
                raw as i16
            } else {
                raw as i16 - 4096
            };
            let sample = decode_sample(&pack_frame(expected, expected, expected, expected));
            assert_eq!(sample.x, expected);
            assert_eq!(sample.y, expected);
            assert_eq!(sample.z, expected);
            assert_eq!(sample.t, expected);
        }
    }

    #[test]
    fn round_trips_packed_tuples() {
        let values = [-2048i16, -1024, -1, 0, 1, 256, 2047];
        for &x in &values {
            for &y in &values {
                for &z in &values {
                    for &t in &values {
                        let sample = decode_sample(&pack_frame(x, y, z, t));
                        assert_eq!((sample.x, sample.y, sample.z, sample.t), (x, y, z, t));
                        assert!(sample.valid);
                    }
                }
            }
        }
    }

    #[test]
    fn decodes_reference_frame() {
        let frame = [0x10, 0x20, 0x30, 0x00, 0x00, 0x00, 0x00];
        let sample = decode_sample(&frame);
        assert_eq!(sample.x, 256);
        assert_eq!(sample.y, 512);
        assert_eq!(sample.z, 768);
        assert_eq!(sample.t, 0);
        assert!(sample.valid);
    }

    #[test]
    fn flags_torn_frames() {
        let mut frame = pack_frame(256, 512, 768, 0);
        assert!(decode_sample(&frame).valid);

        frame[3] |= 0b0000_0001;
        assert!(!decode_sample(&frame).valid);

        frame[3] = (frame[3] & !0b0000_0011) | 0b0000_0010;
        assert!(!decode_sample(&frame).valid);
    }

    #[test]
    fn config_preserves_factory_bits() {
        let mut image = [0u8; REGISTER_IMAGE_LEN];
        image[7] = 0b1010_1010;
        image[8] = 0b0101_0101;
        image[9] = 0b1111_0110;

        for mode in [
            PowerMode::UltraLowPower,
            PowerMode::LowPower,
            PowerMode::FastMode,
            PowerMode::PowerDown,
        ] {
            let pattern = mode.pattern();
            // the mode pattern never reaches into the factory bit positions
            assert_eq!(pattern[1] & 0b0111_1000, 0);
            assert_eq!(pattern[3] & 0b0000_1111, 0);

            let frame = build_config_frame(&image, mode);
            assert_eq!(frame[0], 0);
            assert_eq!(frame[1] & 0b0111_1000, image[7] & 0b0111_1000);
            assert_eq!(frame[1] & 0b0000_0111, pattern[1]);
            assert_eq!(frame[2], image[8] | pattern[2]);
            assert_eq!(frame[3] & 0b0000_1111, image[9] & 0b0000_1111);
            assert_eq!(frame[3] & 0b1110_0000, pattern[3]);
        }

        // every preset leaves byte 2 a pure copy of read register 8
        let frame = build_config_frame(&image, PowerMode::LowPower);
        assert_eq!(frame[2], image[8]);
    }

    #[test]
    fn header_repeats_every_15_rows() {
        let mut headers = 0;
        for row in 0u32..45 {
            if header_due(row) {
                headers += 1;
                assert_eq!(row % HEADER_EVERY, 0);
            }
        }
        assert_eq!(headers, 3);
        assert!(header_due(0));
        assert!(!header_due(1));
        assert!(header_due(15));
        assert!(header_due(30));
    }

    #[test]
    fn formats_tab_separated_rows() {
        let sample = Sample {
            x: -2048,
            y: 0,
            z: 17,
            t: 2047,
            valid: true,
        };
        let row = format_row(&sample);
        assert_eq!(row.as_str(), "-2048\t0\t17\t2047");
    }

    #[test]
    fn converts_to_physical_units() {
        let sample = Sample {
            x: 0,
            y: 0,
            z: 100,
            t: 340,
            valid: true,
        };
        let (bx, by, bz) = sample.field_mt();
        assert!(bx == 0.0 && by == 0.0);
        assert!((bz - 9.8).abs() < 1e-3);
        assert!((sample.magnitude_mt() - 9.8).abs() < 1e-3);
        assert!((sample.temperature_c() - 25.0).abs() < 1e-3);
    }
}
