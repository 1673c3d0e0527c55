use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Session file the Riot Client keeps in its data folder.
pub const SESSION_FILE: &str = "RiotGamesPrivateSettings.yaml";

/// Riot account cookies as persisted by the Riot Client.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiotCookies {
    pub asid: Option<String>,
    pub ccid: Option<String>,
    pub clid: Option<String>,
    pub sub: Option<String>,
    pub csid: Option<String>,
    pub ssid: Option<String>,
    pub tdid: Option<String>,
}

impl RiotCookies {
    /// Cookies sent to `auth.riotgames.com`. `tdid` lives on `riotgames.com`.
    pub const AUTH_COOKIES: [&'static str; 6] = ["ssid", "asid", "csid", "ccid", "clid", "sub"];

    /// Store `value` under `name`. Returns false for names that are not kept.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        let slot = match name {
            "asid" => &mut self.asid,
            "ccid" => &mut self.ccid,
            "clid" => &mut self.clid,
            "sub" => &mut self.sub,
            "csid" => &mut self.csid,
            "ssid" => &mut self.ssid,
            "tdid" => &mut self.tdid,
            _ => return false,
        };
        *slot = Some(value.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        match name {
            "asid" => self.asid.as_deref(),
            "ccid" => self.ccid.as_deref(),
            "clid" => self.clid.as_deref(),
            "sub" => self.sub.as_deref(),
            "csid" => self.csid.as_deref(),
            "ssid" => self.ssid.as_deref(),
            "tdid" => self.tdid.as_deref(),
            _ => None,
        }
    }

    fn present(&self) -> Vec<&'static str> {
        Self::AUTH_COOKIES
            .into_iter()
            .chain(["tdid"])
            .filter(|name| self.get(name).is_some())
            .collect()
    }
}

// Values are session secrets; only list which ones are set.
impl fmt::Debug for RiotCookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiotCookies")
            .field("present", &self.present())
            .finish()
    }
}

/// Read the session cookies of whatever session is installed in `shared_data`.
///
/// `Ok(None)` when the file, the cookie list or the `ssid` cookie is missing.
pub fn read_session_cookies(shared_data: &Path) -> Result<Option<RiotCookies>> {
    let path = shared_data.join(SESSION_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No session file at {}", path.display());
            return Ok(None);
        }
        Err(e) => {
            return Err(AppError::Cookies(format!(
                "{}: {}",
                path.display(),
                e
            )))
        }
    };

    let cookies = parse_session_cookies(&content)
        .map_err(|e| AppError::Cookies(format!("{}: {}", path.display(), e)))?;
    match &cookies {
        Some(c) => log::debug!("Read session cookies: {:?}", c),
        None => log::debug!("Session file has no ssid cookie"),
    }
    Ok(cookies)
}

fn parse_session_cookies(content: &str) -> std::result::Result<Option<RiotCookies>, serde_yaml::Error> {
    let doc: serde_yaml::Value = serde_yaml::from_str(content)?;

    let Some(list) = doc
        .get("riot-login")
        .and_then(|v| v.get("persist"))
        .and_then(|v| v.get("session"))
        .and_then(|v| v.get("cookies"))
        .and_then(|v| v.as_sequence())
    else {
        return Ok(None);
    };

    let mut cookies = RiotCookies::default();
    for cookie in list {
        let name = cookie.get("name").and_then(|v| v.as_str());
        let value = cookie.get("value").and_then(|v| v.as_str());
        if let (Some(name), Some(value)) = (name, value) {
            if name != "tdid" {
                cookies.set(name, value);
            }
        }
    }

    cookies.tdid = doc
        .get("rso-authenticator")
        .and_then(|v| v.get("tdid"))
        .and_then(|v| v.get("value"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(cookies.ssid.is_some().then_some(cookies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SESSION_YAML: &str = r#"
riot-login:
  persist:
    region: "AP"
    session:
      cookies:
        - domain: "auth.riotgames.com"
          name: "ssid"
          value: "ssid-value"
        - name: "clid"
          value: "ap1"
        - name: "sub"
          value: "puuid-1234"
        - name: "csid"
          value: "csid-value"
        - name: "unrelated"
          value: "ignored"
rso-authenticator:
  tdid:
    value: "tdid-value"
"#;

    #[test]
    fn test_reads_cookies() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(SESSION_FILE), SESSION_YAML).unwrap();

        let cookies = read_session_cookies(temp_dir.path()).unwrap().unwrap();
        assert_eq!(cookies.ssid.as_deref(), Some("ssid-value"));
        assert_eq!(cookies.clid.as_deref(), Some("ap1"));
        assert_eq!(cookies.sub.as_deref(), Some("puuid-1234"));
        assert_eq!(cookies.tdid.as_deref(), Some("tdid-value"));
        assert!(cookies.asid.is_none());
    }

    #[test]
    fn test_missing_file_is_none() {
        let temp_dir = TempDir::new().unwrap();
        assert!(read_session_cookies(temp_dir.path()).unwrap().is_none());
        assert!(read_session_cookies(&temp_dir.path().join("missing"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_missing_list_or_ssid_is_none() {
        assert!(parse_session_cookies("riot-login:\n  persist: {}\n")
            .unwrap()
            .is_none());

        let without_ssid = "riot-login:\n  persist:\n    session:\n      cookies:\n        - name: clid\n          value: na1\n";
        assert!(parse_session_cookies(without_ssid).unwrap().is_none());
    }

    #[test]
    fn test_malformed_yaml_is_error() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(SESSION_FILE),
            "riot-login: [unclosed\n  : :",
        )
        .unwrap();

        let err = read_session_cookies(temp_dir.path()).unwrap_err();
        assert_eq!(err.kind(), "cookies");
    }

    #[test]
    fn test_debug_hides_values() {
        let mut cookies = RiotCookies::default();
        assert!(cookies.set("ssid", "secret"));
        assert!(!cookies.set("other", "x"));
        let debug = format!("{:?}", cookies);
        assert!(debug.contains("ssid"));
        assert!(!debug.contains("secret"));
    }
}
