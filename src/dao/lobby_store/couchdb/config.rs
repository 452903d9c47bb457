use super::error::{CouchDaoError, CouchResult};

const DEFAULT_DATABASE: &str = "monster_lobby";

/// Where the lobby documents live and how to authenticate against CouchDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    /// Basic-auth `(username, password)`.
    pub credentials: Option<(String, String)>,
}

impl CouchConfig {
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Read `COUCH_BASE_URL` (required), `COUCH_DB` and `COUCH_USERNAME`/`COUCH_PASSWORD`.
    pub fn from_env() -> CouchResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CouchResult<Self> {
        let base_url = lookup("COUCH_BASE_URL").ok_or(CouchDaoError::MissingEnvVar {
            var: "COUCH_BASE_URL",
        })?;
        let database = lookup("COUCH_DB").unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let config = Self::new(base_url, database);
        Ok(match (lookup("COUCH_USERNAME"), lookup("COUCH_PASSWORD")) {
            (Some(username), Some(password)) => config.with_credentials(username, password),
            _ => config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_required() {
        let err = CouchConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(
            err,
            CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL"
            }
        ));
    }

    #[test]
    fn database_defaults_and_credentials_need_both_halves() {
        let config = CouchConfig::from_lookup(|key| match key {
            "COUCH_BASE_URL" => Some("http://couch:5984".into()),
            "COUCH_USERNAME" => Some("admin".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert!(config.credentials.is_none());

        let config = CouchConfig::from_lookup(|key| match key {
            "COUCH_BASE_URL" => Some("http://couch:5984".into()),
            "COUCH_DB" => Some("lobby_test".into()),
            "COUCH_USERNAME" => Some("admin".into()),
            "COUCH_PASSWORD" => Some("secret".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.database, "lobby_test");
        assert_eq!(
            config.credentials,
            Some(("admin".to_string(), "secret".to_string()))
        );
    }
}
