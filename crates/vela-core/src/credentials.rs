use std::path::PathBuf;

use vela_stt::credentials::CredentialSource;

/// Bearer token read from a file that an external process keeps fresh.
///
/// The file is re-read on every call, so a refreshed token takes effect on the
/// next attempt without restarting.
#[derive(Debug, Clone)]
pub struct TokenFileCredential {
    path: PathBuf,
}

impl TokenFileCredential {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for TokenFileCredential {
    fn current(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(token) => {
                let token = token.trim();
                (!token.is_empty()).then(|| token.to_owned())
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "cannot read token file");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_trimmed_token_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "ya29.first\n").unwrap();
        let cred = TokenFileCredential::new(&path);
        assert_eq!(cred.current().as_deref(), Some("ya29.first"));

        std::fs::write(&path, "ya29.second").unwrap();
        assert_eq!(cred.current().as_deref(), Some("ya29.second"));
    }

    #[test]
    fn missing_or_blank_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        let cred = TokenFileCredential::new(&path);
        assert!(cred.current().is_none());

        std::fs::write(&path, "  \n").unwrap();
        assert!(cred.current().is_none());
    }
}
