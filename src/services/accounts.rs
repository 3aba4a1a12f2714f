//! Registration and wallet linkage.

use tracing::{debug, info};
use uuid::Uuid;

use super::engine::ActionEngine;
use super::error::{ActionError, Result};
use crate::model::{referral_code_for, IdentityClaim, NewUser, User};
use crate::ton::validate_address;

impl ActionEngine {
    /// Create or refresh the account for a verified identity.
    ///
    /// The referrer is resolved from `referral_code` on first creation only;
    /// unknown codes and self-referrals are ignored.
    pub async fn register(
        &self,
        claim: IdentityClaim,
        referral_code: Option<&str>,
    ) -> Result<User> {
        let existing = self
            .stores
            .accounts
            .find_by_external_id(claim.external_id)
            .await?;
        let own_code = referral_code_for(claim.external_id);

        let referrer_id = match (&existing, referral_code.map(str::trim)) {
            (None, Some(code)) if !code.is_empty() && !code.eq_ignore_ascii_case(&own_code) => {
                let referrer = self
                    .stores
                    .accounts
                    .find_by_referral_code(&code.to_ascii_lowercase())
                    .await?;
                if referrer.is_none() {
                    debug!(referral_code = code, "Unknown referral code ignored");
                }
                referrer.map(|r| r.id)
            }
            _ => None,
        };

        let is_new = existing.is_none();
        let user = self
            .stores
            .accounts
            .upsert_user(NewUser {
                id: existing.as_ref().map_or_else(Uuid::new_v4, |u| u.id),
                claim,
                referral_code: own_code,
                referrer_id,
                now: self.clock.now(),
            })
            .await?;

        if is_new {
            info!(user_id = %user.id, external_id = user.external_id, referrer_id = ?user.referrer_id, "User registered");
        }
        Ok(user)
    }

    /// Link a TON wallet. Overwrites any previous address.
    pub async fn connect_wallet(&self, user_id: Uuid, address: &str) -> Result<User> {
        let address =
            validate_address(address).map_err(|e| ActionError::Validation(e.to_string()))?;
        self.load_user(user_id).await?;
        let user = self
            .stores
            .accounts
            .set_wallet(user_id, Some(address), self.clock.now())
            .await?;
        info!(%user_id, "Wallet connected");
        Ok(user)
    }

    pub async fn disconnect_wallet(&self, user_id: Uuid) -> Result<User> {
        self.load_user(user_id).await?;
        let user = self
            .stores
            .accounts
            .set_wallet(user_id, None, self.clock.now())
            .await?;
        info!(%user_id, "Wallet disconnected");
        Ok(user)
    }
}
