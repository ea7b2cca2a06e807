// Asynchronous file operations
// Engine work runs on the blocking pool; output goes to a temporary
// sibling and is renamed into place only on success

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use uuid::Uuid;
use zeroize::Zeroizing;

use super::Crypto;
use crate::codec::{normalize, Data, WireText};
use crate::engine::Engine;
use crate::error::{CryptoError, Result};
use crate::keys::{checked_private_key_value, checked_public_key_values, PrivateKeyHandle, PublicKeyHandle};

const FILE_URL_PREFIX: &str = "file://";

/// Accept plain paths and `file://` URLs alike
fn local_path(path: &Path) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_prefix(FILE_URL_PREFIX)) {
        Some(stripped) => PathBuf::from(stripped),
        None => path.to_path_buf(),
    }
}

/// Removes a partially written output unless committed
struct TempFileGuard {
    path: Option<PathBuf>,
}

impl TempFileGuard {
    fn beside(destination: &Path) -> Self {
        let dir = destination.parent().unwrap_or_else(|| Path::new("."));
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path: Some(dir.join(format!(".{}.{}.tmp", name, Uuid::new_v4()))),
        }
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn commit(mut self, destination: &Path) -> Result<()> {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::rename(&path, destination).await {
                self.path = Some(path);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::warn!(path = %path.display(), "removed unfinished output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove unfinished output"),
        }
    }
}

impl<E: Engine> Crypto<E> {
    fn output_path(&self, input: &Path, output: Option<&Path>) -> PathBuf {
        match output {
            Some(path) => local_path(path),
            None => {
                let name = match input.extension() {
                    Some(ext) => format!("{}.{}", Uuid::new_v4(), ext.to_string_lossy()),
                    None => Uuid::new_v4().to_string(),
                };
                self.config.temp_dir().join(name)
            }
        }
    }

    async fn with_timeout<T>(&self, task: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.file_timeout() {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| CryptoError::Timeout)?,
            None => task.await,
        }
    }

    /// Run an engine call on the blocking pool
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&E) -> Result<T> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        tokio::task::spawn_blocking(move || f(engine.as_ref()))
            .await
            .map_err(|e| CryptoError::TaskFailed(e.to_string()))?
    }

    async fn write_output(&self, destination: &Path, contents: &[u8]) -> Result<()> {
        let guard = TempFileGuard::beside(destination);
        if let Some(temp) = guard.path() {
            fs::write(temp, contents).await?;
        }
        guard.commit(destination).await
    }

    /// Encrypt a file for `public_keys`; returns the output path.
    ///
    /// Without `output_path` the result lands in the configured temp
    /// directory under a random name keeping the input's extension.
    pub async fn encrypt_file(
        &self,
        input_path: impl AsRef<Path>,
        output_path: Option<&Path>,
        public_keys: &[PublicKeyHandle],
        enable_padding: bool,
    ) -> Result<PathBuf> {
        let input = local_path(input_path.as_ref());
        let output = self.output_path(&input, output_path);
        let recipients = checked_public_key_values(public_keys)?;

        tracing::debug!(input = %input.display(), output = %output.display(), "encrypting file");
        self.with_timeout(async {
            let plain = Zeroizing::new(fs::read(&input).await?);
            let data = Zeroizing::new(WireText::encode(&plain));
            let sealed = self
                .blocking(move |engine| {
                    tracing::trace!(op = "encrypt", "engine call");
                    engine.encrypt(&data, &recipients, enable_padding).into_result()?.decode()
                })
                .await?;
            self.write_output(&output, &sealed).await
        })
        .await?;

        tracing::debug!(output = %output.display(), "file encrypted");
        Ok(output)
    }

    /// Decrypt a file with `private_key`; returns the output path
    pub async fn decrypt_file(
        &self,
        input_path: impl AsRef<Path>,
        output_path: Option<&Path>,
        private_key: &PrivateKeyHandle,
    ) -> Result<PathBuf> {
        let input = local_path(input_path.as_ref());
        let output = self.output_path(&input, output_path);
        let private = checked_private_key_value(&self.store, private_key)?;

        tracing::debug!(input = %input.display(), output = %output.display(), "decrypting file");
        self.with_timeout(async {
            let data = WireText::encode(&fs::read(&input).await?);
            let plain = self
                .blocking(move |engine| {
                    tracing::trace!(op = "decrypt", "engine call");
                    let plain = engine.decrypt(&data, &private).into_result()?;
                    plain.decode_secret().map(Zeroizing::new)
                })
                .await?;
            self.write_output(&output, &plain).await
        })
        .await?;

        tracing::debug!(output = %output.display(), "file decrypted");
        Ok(output)
    }

    pub async fn generate_file_signature(
        &self,
        input_path: impl AsRef<Path>,
        private_key: &PrivateKeyHandle,
    ) -> Result<Vec<u8>> {
        let input = local_path(input_path.as_ref());
        let private = checked_private_key_value(&self.store, private_key)?;

        self.with_timeout(async {
            let data = WireText::encode(&fs::read(&input).await?);
            self.blocking(move |engine| {
                tracing::trace!(op = "generate_signature", "engine call");
                engine.generate_signature(&data, &private).into_result()?.decode()
            })
            .await
        })
        .await
    }

    /// String signatures are read as base64
    pub async fn verify_file_signature(
        &self,
        signature: impl Into<Data>,
        input_path: impl AsRef<Path>,
        public_key: &PublicKeyHandle,
    ) -> Result<bool> {
        let signature = normalize(Some(&signature.into()), Some("base64"), "signature")?;
        let input = local_path(input_path.as_ref());
        let public = public_key.value().clone();

        self.with_timeout(async {
            let data = WireText::encode(&fs::read(&input).await?);
            self.blocking(move |engine| {
                tracing::trace!(op = "verify_signature", "engine call");
                engine.verify_signature(&signature, &data, &public).into_result()
            })
            .await
        })
        .await
    }
}
