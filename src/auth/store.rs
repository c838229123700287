//! Client identity and token cache persistence

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Datelike, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Redirect URI used when the credential file lists no loopback address
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080";

/// Port assumed for loopback redirect URIs that omit one
const DEFAULT_REDIRECT_PORT: u16 = 8080;

/// Tokens are treated as expired this long before their stated expiry
const EXPIRY_SKEW_SECONDS: i64 = 10;

/// OAuth2 client identity loaded from the credential file
#[derive(Debug)]
pub struct ClientIdentity {
    pub client_id: String,
    pub client_secret: SecretString,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
}

/// On-disk credential file layout
#[derive(Deserialize)]
struct CredentialFile {
    #[serde(alias = "web")]
    installed: InstalledApp,
}

#[derive(Deserialize)]
struct InstalledApp {
    client_id: String,
    client_secret: String,
    auth_uri: String,
    token_uri: String,
    #[serde(default)]
    redirect_uris: Vec<String>,
}

impl ClientIdentity {
    /// Client secret for token endpoint requests
    #[must_use]
    pub fn secret(&self) -> &str {
        self.client_secret.expose_secret()
    }

    /// Replace the redirect URI (configuration override)
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }
}

/// Load the client identity from a JSON credential file
///
/// # Errors
///
/// Returns `Error::CredentialRead` if the file is missing, unreadable, or malformed
pub fn load_identity(path: &Path) -> Result<ClientIdentity> {
    let read_error = |reason: String| Error::CredentialRead {
        path: path.to_path_buf(),
        reason,
    };

    let content = fs::read_to_string(path).map_err(|e| read_error(e.to_string()))?;
    let file: CredentialFile =
        serde_json::from_str(&content).map_err(|e| read_error(e.to_string()))?;
    let app = file.installed;

    if app.client_id.is_empty() {
        return Err(read_error("client_id is empty".to_string()));
    }

    let redirect_uri = loopback_redirect(&app.redirect_uris);
    tracing::debug!(
        path = %path.display(),
        client_id = %app.client_id,
        redirect_uri = %redirect_uri,
        "loaded client identity"
    );

    Ok(ClientIdentity {
        client_id: app.client_id,
        client_secret: SecretString::from(app.client_secret),
        authorization_endpoint: app.auth_uri,
        token_endpoint: app.token_uri,
        redirect_uri,
    })
}

/// Pick the first `http://` redirect URI, adding the default port when absent
fn loopback_redirect(candidates: &[String]) -> String {
    candidates
        .iter()
        .filter_map(|raw| Url::parse(raw).ok())
        .find(|url| url.scheme() == "http" && url.host_str().is_some())
        .map_or_else(
            || DEFAULT_REDIRECT_URI.to_string(),
            |mut url| {
                if url.port().is_none() {
                    // Setting a port on an http URL with a host cannot fail
                    let _ = url.set_port(Some(DEFAULT_REDIRECT_PORT));
                }
                url.as_str().trim_end_matches('/').to_string()
            },
        )
}

/// OAuth2 token as granted by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry; absent means the token does not expire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl Token {
    /// Whether the token has expired at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            // Zero timestamps written by other OAuth2 clients mean "never"
            Some(expiry) if expiry.year() > 1 => {
                expiry - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now
            }
            _ => false,
        }
    }

    /// Whether the token can be used right now
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired_at(Utc::now())
    }

    /// Whether an expired token can be renewed without user consent
    #[must_use]
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Read a previously cached token
///
/// Missing or unparsable cache files yield `None`; the caller re-authorizes.
pub fn load_cached_token(path: &Path) -> Option<Token> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no cached token");
            return None;
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read token cache");
            return None;
        }
    };

    match serde_json::from_str::<Token>(&content) {
        Ok(token) => {
            tracing::debug!(path = %path.display(), "loaded cached token");
            Some(token)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "ignoring malformed token cache"
            );
            None
        }
    }
}

/// Persist a token, replacing the cache file atomically
///
/// # Errors
///
/// Returns error if the directory cannot be created or the file cannot be written
pub fn save_token(path: &Path, token: &Token) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, token)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    tracing::debug!(path = %path.display(), "saved token");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    const CREDENTIALS: &str = r#"{
        "installed": {
            "client_id": "123.apps.example.com",
            "project_id": "demo",
            "auth_uri": "https://accounts.example.com/o/oauth2/auth",
            "token_uri": "https://oauth2.example.com/token",
            "auth_provider_x509_cert_url": "https://www.example.com/oauth2/v1/certs",
            "client_secret": "s3cret",
            "redirect_uris": ["urn:ietf:wg:oauth:2.0:oob", "http://localhost"]
        }
    }"#;

    fn token(expiry: Option<DateTime<Utc>>) -> Token {
        Token {
            access_token: "ya29.token".to_string(),
            token_type: "Bearer".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            expiry,
        }
    }

    #[test]
    fn loads_installed_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, CREDENTIALS).unwrap();

        let identity = load_identity(&path).unwrap();
        assert_eq!(identity.client_id, "123.apps.example.com");
        assert_eq!(identity.secret(), "s3cret");
        assert_eq!(identity.token_endpoint, "https://oauth2.example.com/token");
        assert_eq!(identity.redirect_uri, "http://localhost:8080");
    }

    #[test]
    fn missing_identity_is_credential_error() {
        let err = load_identity(Path::new("/nonexistent/credentials.json")).unwrap_err();
        assert!(matches!(err, Error::CredentialRead { .. }));
    }

    #[test]
    fn wrong_shape_is_credential_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, r#"{"client_id": "flat"}"#).unwrap();

        let err = load_identity(&path).unwrap_err();
        assert!(matches!(err, Error::CredentialRead { .. }));
    }

    #[test]
    fn redirect_keeps_explicit_port() {
        let uris = vec!["http://127.0.0.1:9004/".to_string()];
        assert_eq!(loopback_redirect(&uris), "http://127.0.0.1:9004");
        assert_eq!(loopback_redirect(&[]), DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn missing_cache_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_cached_token(&dir.path().join("oauthToken.cache")).is_none());
    }

    #[test]
    fn malformed_cache_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauthToken.cache");
        fs::write(&path, "{\"access_tok").unwrap();
        assert!(load_cached_token(&path).is_none());

        fs::write(&path, "").unwrap();
        assert!(load_cached_token(&path).is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("oauthToken.cache");
        let expiry = Utc.with_ymd_and_hms(2031, 1, 2, 3, 4, 5).unwrap();

        save_token(&path, &token(Some(expiry))).unwrap();
        let loaded = load_cached_token(&path).unwrap();
        assert_eq!(loaded, token(Some(expiry)));

        // Overwrite leaves no temp files behind
        save_token(&path, &token(None)).unwrap();
        let entries = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn reads_go_style_cache() {
        let json = r#"{"access_token":"ya29.a","token_type":"Bearer","refresh_token":"1//r","expiry":"0001-01-01T00:00:00Z"}"#;
        let token: Token = serde_json::from_str(json).unwrap();
        assert!(token.is_valid());
    }

    #[test]
    fn expiry_honours_skew() {
        let now = Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap();
        assert!(token(Some(now + Duration::seconds(5))).is_expired_at(now));
        assert!(!token(Some(now + Duration::seconds(60))).is_expired_at(now));
        assert!(!token(None).is_expired_at(now));
    }

    #[test]
    fn refreshable_needs_non_empty_refresh_token() {
        let mut t = token(None);
        assert!(t.is_refreshable());
        t.refresh_token = Some(String::new());
        assert!(!t.is_refreshable());
    }
}
