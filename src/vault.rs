// 5.0 vault.rs: internal reserve vault. holds per-token balances locked away
// from the working AMM position, so recentering can relocate tokens without
// touching the market. balances may run negative up to a bounded borrow
// (tracked as debt) as a last-resort funding source during recenter.

use crate::types::{Amount, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("vault shortfall for {token:?}: need {need}, locked {locked}, borrow limit {borrow_limit}")]
    Shortfall {
        token: Token,
        need: Amount,
        locked: Amount,
        borrow_limit: Amount,
    },

    #[error("unlock exceeds locked balance for {token:?}")]
    InsufficientLocked { token: Token },
}

/// Locked reserves per token. Signed internally: a negative balance is
/// outstanding borrow (debt) that future deposits repay first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveVault {
    synth: Decimal,
    reserve: Decimal,
}

impl ReserveVault {
    pub fn new() -> Self {
        Self {
            synth: Decimal::ZERO,
            reserve: Decimal::ZERO,
        }
    }

    fn slot(&mut self, token: Token) -> &mut Decimal {
        match token {
            Token::Synth => &mut self.synth,
            Token::Reserve => &mut self.reserve,
        }
    }

    fn raw(&self, token: Token) -> Decimal {
        match token {
            Token::Synth => self.synth,
            Token::Reserve => self.reserve,
        }
    }

    /// Usable locked balance (zero while debt is outstanding).
    pub fn locked(&self, token: Token) -> Amount {
        Amount::new_unchecked(self.raw(token).max(Decimal::ZERO))
    }

    /// Outstanding borrow, positive when the vault owes tokens.
    pub fn debt(&self, token: Token) -> Amount {
        Amount::new_unchecked((-self.raw(token)).max(Decimal::ZERO))
    }

    /// Net signed balance, used by the accounting identity.
    pub fn net(&self, token: Token) -> Decimal {
        self.raw(token)
    }

    /// Deposit into the vault. Repays debt first by construction (the signed
    /// balance simply moves up).
    pub fn deposit(&mut self, token: Token, amount: Amount) {
        *self.slot(token) += amount.value();
    }

    /// Plain unlock, never borrows.
    pub fn unlock(&mut self, token: Token, amount: Amount) -> Result<(), VaultError> {
        let slot = self.slot(token);
        if *slot < amount.value() {
            return Err(VaultError::InsufficientLocked { token });
        }
        *slot -= amount.value();
        Ok(())
    }

    /// Unlock `need`, borrowing beyond the locked balance up to `borrow_limit`
    /// below zero. Fails without mutating when the bound would be exceeded.
    pub fn unlock_with_borrow(
        &mut self,
        token: Token,
        need: Amount,
        borrow_limit: Amount,
    ) -> Result<(), VaultError> {
        let balance = self.raw(token);
        let after = balance - need.value();
        if after < -borrow_limit.value() {
            return Err(VaultError::Shortfall {
                token,
                need,
                locked: self.locked(token),
                borrow_limit,
            });
        }
        *self.slot(token) = after;
        Ok(())
    }
}

impl Default for ReserveVault {
    fn default() -> Self {
        Self::new()
    }
}
