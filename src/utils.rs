use chrono::{DateTime, Utc};
use std::time::SystemTime;

use crate::error::{DfsResult, Error};

const KB: i64 = 1024;
const MB: i64 = KB * 1024;
const GB: i64 = MB * 1024;

pub fn datetime(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Formats a byte count as whole kilobytes below 1 MiB, whole megabytes below
/// 1 GiB and whole gigabytes above. Values are truncated, never rounded.
pub fn convert_size(size: i64) -> DfsResult<String> {
    match size {
        s if s < 0 => Err(Error::InvalidInput(format!("negative size {s}"))),
        s if s < MB => Ok(format!("{} KB", s / KB)),
        s if s < GB => Ok(format!("{} MB", s / MB)),
        s => Ok(format!("{} GB", s / GB)),
    }
}

/// [`convert_size`] for lengths reported by a store.
pub fn convert_len(len: u64) -> DfsResult<String> {
    let size = i64::try_from(len)
        .map_err(|_| Error::InvalidInput(format!("size {len} out of range")))?;
    convert_size(size)
}
