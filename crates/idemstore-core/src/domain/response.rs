//! StoredResponse - キャッシュ可能なレスポンス
//!
//! status + body の組。ストア自身は payload の中身を見ないので、
//! 「キャッシュできるか」の判断はこの型を組み立てる側（guard / transport）が行う。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A response that can be replayed verbatim for a retried request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Encode `value` as a JSON body.
    pub fn json<T: Serialize + ?Sized>(status: u16, value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            status,
            body: serde_json::to_vec(value)?,
        })
    }

    /// Decode the body as JSON.
    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body_is_replayed_unchanged() {
        let resp = StoredResponse::json(201, &json!({"test": "test"})).unwrap();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.body, br#"{"test":"test"}"#);

        let decoded: serde_json::Value = resp.body_json().unwrap();
        assert_eq!(decoded, json!({"test": "test"}));
    }
}
