use core::fmt::Write;

use heapless::String;

use crate::tlv493d::Sample;

/// The column header is repeated every this many received samples.
pub const HEADER_EVERY: u32 = 15;

pub const HEADER_ROW: &str = "x\ty\tz\tt";
pub const READ_ERROR_MARKER: &str = "Data read error!";

pub type Row = String<48>;

/// True when a header line belongs before the row with this index.
pub fn header_due(received: u32) -> bool {
    received % HEADER_EVERY == 0
}

/// One tab-separated output row. Four i16 columns never overflow the buffer.
pub fn format_row(sample: &Sample) -> Row {
    let mut row = Row::new();
    let _ = write!(&mut row, "{}\t{}\t{}\t{}", sample.x, sample.y, sample.z, sample.t);
    row
}
