use crate::StravaError;
use secrecy::SecretString;

pub const DEFAULT_BASE_URL: &str = "https://www.strava.com/api/v3";

#[derive(Clone, Debug)]
pub struct Config {
    pub access_token: SecretString,
    pub base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, StravaError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Testable helper that reads configuration values using the provided
    /// function, so tests never touch the process environment.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, StravaError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let token = get("STRAVA_ACCESS_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| StravaError::Config("STRAVA_ACCESS_TOKEN missing".into()))?;
        let base_url = get("STRAVA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        Ok(Self {
            access_token: SecretString::new(token.into()),
            base_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn from_env_missing_token() {
        let get = |k: &str| match k {
            "STRAVA_BASE_URL" => Some("http://localhost".into()),
            _ => None,
        };
        let res = Config::from_env_with(get);
        assert!(matches!(res, Err(StravaError::Config(_))));
    }

    #[test]
    fn from_env_rejects_blank_token() {
        let get = |k: &str| match k {
            "STRAVA_ACCESS_TOKEN" => Some("   ".into()),
            _ => None,
        };
        assert!(Config::from_env_with(get).is_err());
    }

    #[test]
    fn from_env_reads_values() {
        let get = |k: &str| match k {
            "STRAVA_ACCESS_TOKEN" => Some("sekrit".into()),
            "STRAVA_BASE_URL" => Some("http://localhost".into()),
            _ => None,
        };
        let cfg = Config::from_env_with(get).expect("cfg");
        assert_eq!(cfg.access_token.expose_secret(), "sekrit");
        assert_eq!(cfg.base_url, "http://localhost");
    }

    #[test]
    fn from_env_defaults_base_url() {
        let get = |k: &str| match k {
            "STRAVA_ACCESS_TOKEN" => Some("sekrit".into()),
            _ => None,
        };
        let cfg = Config::from_env_with(get).expect("cfg");
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
    }
}
