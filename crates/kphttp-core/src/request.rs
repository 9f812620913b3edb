use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "1.8.4.2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestType {
    TestAssociate,
    Associate,
    GetLogins,
    GetLoginsCount,
    GetAllLogins,
    SetLogin,
    GeneratePassword,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::TestAssociate => "test-associate",
            RequestType::Associate => "associate",
            RequestType::GetLogins => "get-logins",
            RequestType::GetLoginsCount => "get-logins-count",
            RequestType::GetAllLogins => "get-all-logins",
            RequestType::SetLogin => "set-login",
            RequestType::GeneratePassword => "generate-password",
        }
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attributes shared by every request variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RequestHeader {
    #[serde(
        default,
        deserialize_with = "lenient_bool",
        skip_serializing_if = "Option::is_none"
    )]
    pub trigger_unlock: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Base64 of the 16 byte IV chosen by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Base64 of `encrypt(key, nonce, base64(nonce))`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestAssociate {
    #[serde(flatten)]
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Associate {
    #[serde(flatten)]
    pub header: RequestHeader,
    /// Base64 of the raw new key; the only variant field that is not ciphertext.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetLogins {
    #[serde(flatten)]
    pub header: RequestHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_selection: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetLoginsCount {
    #[serde(flatten)]
    pub header: RequestHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetAllLogins {
    #[serde(flatten)]
    pub header: RequestHeader,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SetLogin {
    #[serde(flatten)]
    pub header: RequestHeader,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratePassword {
    #[serde(flatten)]
    pub header: RequestHeader,
}

/// A request that matched one of the seven known shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "RequestType")]
pub enum Request {
    #[serde(rename = "test-associate")]
    TestAssociate(TestAssociate),
    #[serde(rename = "associate")]
    Associate(Associate),
    #[serde(rename = "get-logins")]
    GetLogins(GetLogins),
    #[serde(rename = "get-logins-count")]
    GetLoginsCount(GetLoginsCount),
    #[serde(rename = "get-all-logins")]
    GetAllLogins(GetAllLogins),
    #[serde(rename = "set-login")]
    SetLogin(SetLogin),
    #[serde(rename = "generate-password")]
    GeneratePassword(GeneratePassword),
}

impl Request {
    /// Decode an arbitrary inbound value. Anything that is not an object with
    /// a known `RequestType` and correctly typed fields is rejected.
    pub fn classify(value: &Value) -> Option<Request> {
        Request::deserialize(value).ok()
    }

    pub fn request_type(&self) -> RequestType {
        match self {
            Request::TestAssociate(_) => RequestType::TestAssociate,
            Request::Associate(_) => RequestType::Associate,
            Request::GetLogins(_) => RequestType::GetLogins,
            Request::GetLoginsCount(_) => RequestType::GetLoginsCount,
            Request::GetAllLogins(_) => RequestType::GetAllLogins,
            Request::SetLogin(_) => RequestType::SetLogin,
            Request::GeneratePassword(_) => RequestType::GeneratePassword,
        }
    }

    pub fn header(&self) -> &RequestHeader {
        match self {
            Request::TestAssociate(r) => &r.header,
            Request::Associate(r) => &r.header,
            Request::GetLogins(r) => &r.header,
            Request::GetLoginsCount(r) => &r.header,
            Request::GetAllLogins(r) => &r.header,
            Request::SetLogin(r) => &r.header,
            Request::GeneratePassword(r) => &r.header,
        }
    }
}

// Some browser plugins send TriggerUnlock as the string "true"/"false".
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        None => None,
        Some(Flag::Bool(b)) => Some(b),
        Some(Flag::Text(s)) => Some(s.eq_ignore_ascii_case("true")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_known_types() {
        let req = Request::classify(&json!({
            "RequestType": "get-logins",
            "Id": "client",
            "Nonce": "bm9uY2U=",
            "Verifier": "dmVyaWZpZXI=",
            "Url": "dXJs",
            "SortSelection": "true"
        }))
        .unwrap();
        assert_eq!(req.request_type(), RequestType::GetLogins);
        assert_eq!(req.header().id.as_deref(), Some("client"));
        match req {
            Request::GetLogins(r) => {
                assert_eq!(r.url.as_deref(), Some("dXJs"));
                assert!(r.submit_url.is_none());
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(Request::classify(&json!("Foo")).is_none());
        assert!(Request::classify(&json!(null)).is_none());
        assert!(Request::classify(&json!({})).is_none());
        assert!(Request::classify(&json!({"RequestType": "delete-everything"})).is_none());
        assert!(Request::classify(&json!({"RequestType": "get-logins", "Url": 42})).is_none());
    }

    #[test]
    fn associate_key_is_optional_in_shape() {
        let req = Request::classify(&json!({"RequestType": "associate"})).unwrap();
        match req {
            Request::Associate(a) => assert!(a.key.is_none()),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn trigger_unlock_accepts_strings() {
        let req = Request::classify(&json!({
            "RequestType": "test-associate",
            "TriggerUnlock": "true"
        }))
        .unwrap();
        assert_eq!(req.header().trigger_unlock, Some(true));
        let req = Request::classify(&json!({
            "RequestType": "test-associate",
            "TriggerUnlock": false
        }))
        .unwrap();
        assert_eq!(req.header().trigger_unlock, Some(false));
    }

    #[test]
    fn wire_tags_match_display() {
        for ty in [
            RequestType::TestAssociate,
            RequestType::Associate,
            RequestType::GetLogins,
            RequestType::GetLoginsCount,
            RequestType::GetAllLogins,
            RequestType::SetLogin,
            RequestType::GeneratePassword,
        ] {
            assert_eq!(serde_json::to_value(ty).unwrap(), json!(ty.as_str()));
        }
    }
}
