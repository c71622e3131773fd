use super::Encryptor;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Symmetric encryption with `gpg -c`, passphrase read from the key file.
pub struct GpgEncryptor {
    program: String,
}

impl Default for GpgEncryptor {
    fn default() -> Self {
        Self {
            program: "gpg".to_string(),
        }
    }
}

impl GpgEncryptor {
    pub fn with_program(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

pub fn encrypted_path(plaintext: &Path) -> PathBuf {
    let mut name = plaintext.as_os_str().to_os_string();
    name.push(".enc");
    PathBuf::from(name)
}

impl Encryptor for GpgEncryptor {
    fn encrypt(&self, plaintext: &Path, key_file: &Path) -> Result<PathBuf> {
        let output = encrypted_path(plaintext);
        debug!("Encrypting {} -> {}", plaintext.display(), output.display());
        let status = Command::new(&self.program)
            .arg("--batch")
            .arg("--yes")
            .arg("-c")
            .arg("--pinentry-mode=loopback")
            .arg("--passphrase-file")
            .arg(key_file)
            .arg("-o")
            .arg(&output)
            .arg(plaintext)
            .status()
            .map_err(|e| Error::EncryptionFailed(format!("cannot run {}: {}", self.program, e)))?;
        if !status.success() {
            return Err(Error::EncryptionFailed(format!(
                "{} exited with {} for {}",
                self.program,
                status,
                plaintext.display()
            )));
        }
        Ok(output)
    }
}
