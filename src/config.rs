use crate::error::{Error, Result};

/// Service configuration, populated from flags or the environment the way
/// the deployment supplies them.
#[derive(clap::Parser, Debug, Clone)]
pub struct Config {
    /// Apple developer team identifier (10 uppercase alphanumerics).
    #[arg(long, env = "APPLE_TEAM_ID")]
    pub team_id: String,
    /// App bundle identifier in reverse-DNS form.
    #[arg(long, env = "BUNDLE_IDENTIFIER")]
    pub bundle_id: String,
    /// Deployment environment; anything but "production" keeps App Attest
    /// in its development environment.
    #[arg(long, env = "ENVIRONMENT", default_value = "development")]
    pub environment: String,
    /// Directory holding the per-device attestation records.
    #[arg(long, env = "ATTESTATION_DATA_DIR", default_value = "./attestations")]
    pub data_dir: std::path::PathBuf,
}

impl Config {
    pub fn dev_mode(&self) -> bool {
        self.environment != "production"
    }

    /// The App ID the RP-ID hash is computed over.
    pub fn app_id(&self) -> String {
        format!("{}.{}", self.team_id, self.bundle_id)
    }

    /// Pre-flight format checks; run once at startup so a mis-set
    /// environment fails loudly instead of rejecting every device.
    pub fn validate(&self) -> Result<()> {
        let team_ok = self.team_id.len() == 10
            && self
                .team_id
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
        if !team_ok {
            return Err(Error::InvalidInput(
                "team id must be 10 uppercase alphanumerics".into(),
            ));
        }

        let labels: Vec<&str> = self.bundle_id.split('.').collect();
        let bundle_ok = labels.len() >= 2
            && labels.iter().all(|label| {
                !label.is_empty()
                    && label
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
            });
        if !bundle_ok {
            return Err(Error::InvalidInput(
                "bundle id must be reverse-DNS".into(),
            ));
        }
        Ok(())
    }
}
