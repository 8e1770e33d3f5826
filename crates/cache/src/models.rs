use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use hondana_library::VolumeId;
use time::OffsetDateTime;

/// What the index knows about one thumbnail on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRecord {
    pub volume_id: VolumeId,
    /// Modification time of the volume file the thumbnail was rendered from.
    pub source_mtime: OffsetDateTime,
    pub generated_at: OffsetDateTime,
    /// Size of the PNG file.
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ThumbnailRow {
    pub volume_id: String,
    pub source_mtime: i64,
    pub generated_at: i64,
    pub byte_size: i64,
    pub width: i64,
    pub height: i64,
}

pub(crate) fn to_nanos(at: OffsetDateTime) -> Result<i64, Error> {
    i64::try_from(at.unix_timestamp_nanos()).or_raise(|| ErrorKind::InvalidData("timestamp"))
}

fn from_nanos(nanos: i64) -> Result<OffsetDateTime, Error> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).or_raise(|| ErrorKind::InvalidData("timestamp"))
}

impl TryFrom<&ThumbnailRecord> for ThumbnailRow {
    type Error = Error;
    fn try_from(record: &ThumbnailRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            volume_id: record.volume_id.to_string(),
            source_mtime: to_nanos(record.source_mtime)?,
            generated_at: to_nanos(record.generated_at)?,
            byte_size: i64::try_from(record.byte_size).or_raise(|| ErrorKind::InvalidData("byte size"))?,
            width: i64::from(record.width),
            height: i64::from(record.height),
        })
    }
}

impl TryFrom<ThumbnailRow> for ThumbnailRecord {
    type Error = Error;
    fn try_from(row: ThumbnailRow) -> Result<Self, Self::Error> {
        Ok(Self {
            volume_id: row.volume_id.parse::<VolumeId>().or_raise(|| ErrorKind::InvalidData("volume id"))?,
            source_mtime: from_nanos(row.source_mtime)?,
            generated_at: from_nanos(row.generated_at)?,
            byte_size: u64::try_from(row.byte_size).or_raise(|| ErrorKind::InvalidData("byte size"))?,
            width: u32::try_from(row.width).or_raise(|| ErrorKind::InvalidData("width"))?,
            height: u32::try_from(row.height).or_raise(|| ErrorKind::InvalidData("height"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hondana_library::identify;

    #[test]
    fn test_nanosecond_precision_survives() {
        let mtime = OffsetDateTime::from_unix_timestamp_nanos(1_760_000_000_123_456_789).unwrap();
        let record = ThumbnailRecord {
            volume_id: identify("/library/Series-A/vol1.pdf").unwrap(),
            source_mtime: mtime,
            generated_at: mtime,
            byte_size: 2048,
            width: 160,
            height: 240,
        };
        let row = ThumbnailRow::try_from(&record).unwrap();
        assert_eq!(row.source_mtime, 1_760_000_000_123_456_789);
        assert_eq!(ThumbnailRecord::try_from(row).unwrap(), record);
    }

    #[test]
    fn test_invalid_rows_rejected() {
        let row = ThumbnailRow {
            volume_id: "not-a-volume".to_string(),
            source_mtime: 0,
            generated_at: 0,
            byte_size: 1,
            width: 1,
            height: 1,
        };
        let err = ThumbnailRecord::try_from(row).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData("volume id")));
    }
}
