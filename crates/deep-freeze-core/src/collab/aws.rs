use super::ColdStore;
use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// S3 through the `aws` command line client.
pub struct AwsCliColdStore {
    profile: String,
    region: String,
    bucket: String,
}

impl AwsCliColdStore {
    pub fn new(profile: &str, region: &str, bucket: &str) -> Self {
        Self {
            profile: profile.to_string(),
            region: region.to_string(),
            bucket: bucket.to_string(),
        }
    }

    fn url(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new("aws");
        cmd.arg("--profile")
            .arg(&self.profile)
            .arg("--region")
            .arg(&self.region)
            .arg("s3");
        cmd
    }
}

impl ColdStore for AwsCliColdStore {
    fn put(&self, path: &Path, key: &str, storage_class: &str) -> Result<()> {
        let url = self.url(key);
        debug!("Uploading {} to {} ({})", path.display(), url, storage_class);
        let status = self
            .command()
            .arg("cp")
            .arg("--storage-class")
            .arg(storage_class)
            .arg(path)
            .arg(&url)
            .status()
            .map_err(|e| Error::TransferFailed(format!("cannot run aws: {}", e)))?;
        if !status.success() {
            return Err(Error::TransferFailed(format!(
                "aws s3 cp to {} exited with {}",
                url, status
            )));
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let url = self.url(key);
        debug!("Removing {}", url);
        let status = self
            .command()
            .arg("rm")
            .arg(&url)
            .status()
            .map_err(|e| Error::RemoteDeleteFailed(format!("cannot run aws: {}", e)))?;
        if !status.success() {
            return Err(Error::RemoteDeleteFailed(format!(
                "aws s3 rm {} exited with {}",
                url, status
            )));
        }
        Ok(())
    }
}
