use crate::bridge::Bridge;
use crate::error::Result;
use crate::handle::{Handle, Resource};
use crate::marshal::c_string;
use crate::work::PendingFuture;

use super::{into_handle, owned};

impl Bridge {
    /// Derives a root encryption key from a passphrase and salt. The key is
    /// used with [`access_override_encryption_key`](Self::access_override_encryption_key).
    pub fn derive_encryption_key(
        &self,
        passphrase: &str,
        salt: &[u8],
    ) -> Result<PendingFuture<Handle>> {
        let input = (c_string("passphrase", passphrase)?, salt.to_vec());
        self.submit(
            "derive_encryption_key",
            input,
            |library, (passphrase, salt)| unsafe {
                owned(
                    library,
                    library.derive_encryption_key(passphrase.as_ptr(), salt.as_mut_ptr().cast(), salt.len()),
                )
            },
            |ctx, _, result| into_handle(ctx, result, Resource::EncryptionKey),
        )
    }
}
