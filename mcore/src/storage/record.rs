use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::measure::{Measure, result_to_string};

/// One processed conversion, as persisted.
#[readonly::make]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: String,
    pub measurement_value: String,
    /// comma separated, empty for an empty result
    pub result_value: String,
    pub created_at: DateTime<Utc>,
}

impl MeasurementRecord {
    pub fn new(measurement_value: &str, result: &[Measure]) -> MeasurementRecord {
        let created_at = Utc::now();
        MeasurementRecord {
            id: new_record_id(created_at, measurement_value),
            measurement_value: measurement_value.to_owned(),
            result_value: result_to_string(result),
            created_at,
        }
    }
}

/// url-safe base64 of sha1(timestamp | input | salt), 27 chars
fn new_record_id(created_at: DateTime<Utc>, measurement_value: &str) -> String {
    let ts = created_at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| created_at.timestamp());

    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);

    let mut hasher = Sha1::new();
    hasher.update(ts.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(measurement_value.as_bytes());
    hasher.update(b"|");
    hasher.update(salt);

    let digest: [u8; 20] = hasher.finalize().into();
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod test_record {
    use super::*;

    #[test]
    fn record_keeps_input_and_joined_result() {
        let record = MeasurementRecord::new("aab", &[1, 0]);
        assert_eq!(record.measurement_value, "aab");
        assert_eq!(record.result_value, "1,0");
    }

    #[test]
    fn ids_are_url_safe_and_unique() {
        let a = MeasurementRecord::new("aa", &[1]);
        let b = MeasurementRecord::new("aa", &[1]);

        assert_eq!(a.id.len(), 27);
        assert!(
            a.id.bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn json_line_shape() {
        let record = MeasurementRecord::new("a", &[0]);
        let line = serde_json::to_string(&record).unwrap();
        let back: MeasurementRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
        assert!(line.contains("\"result_value\":\"0\""));
    }
}
