//! Graph wire types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use driveup_protocol::{ConflictBehavior, RemoteItem, UploadMetadata};

/// Collection envelope returned by list endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemCollection {
    #[serde(default)]
    pub value: Vec<RemoteItem>,
}

/// Request body of `createUploadSession`.
#[derive(Debug, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub item: SessionItem<'a>,
}

#[derive(Debug, Serialize)]
pub struct SessionItem<'a> {
    #[serde(rename = "@microsoft.graph.conflictBehavior")]
    pub conflict_behavior: ConflictBehavior,
    #[serde(flatten)]
    pub metadata: &'a UploadMetadata,
}

/// Upload session as returned by creation and status requests.
///
/// Status responses omit `uploadUrl`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionBody {
    #[serde(default)]
    pub upload_url: Option<String>,
    #[serde(default)]
    pub expiration_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub next_expected_ranges: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use driveup_protocol::FileSystemInfo;

    #[test]
    fn create_request_shape() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let metadata = UploadMetadata {
            file_size: 42,
            file_system_info: FileSystemInfo {
                created_date_time: at,
                last_modified_date_time: at,
                last_accessed_date_time: at,
            },
        };
        let body = CreateSessionRequest {
            item: SessionItem {
                conflict_behavior: ConflictBehavior::Fail,
                metadata: &metadata,
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["item"]["@microsoft.graph.conflictBehavior"], "fail");
        assert_eq!(json["item"]["fileSize"], 42);
        assert_eq!(
            json["item"]["fileSystemInfo"]["createdDateTime"],
            "2024-03-01T10:00:00Z"
        );
    }

    #[test]
    fn status_body_without_url() {
        let json = r#"{"expirationDateTime":"2024-03-02T10:00:00Z","nextExpectedRanges":["26-"]}"#;
        let body: UploadSessionBody = serde_json::from_str(json).unwrap();
        assert!(body.upload_url.is_none());
        assert_eq!(body.next_expected_ranges, vec!["26-"]);
        assert!(body.expiration_date_time.is_some());
    }

    #[test]
    fn empty_collection() {
        let list: ItemCollection = serde_json::from_str(r#"{"@odata.context":"x"}"#).unwrap();
        assert!(list.value.is_empty());
    }
}
