//! Transaction handling for the ledger
//!
//! A transaction consumes the outputs addressed to its sender in one prior
//! transaction (its input) and redistributes that exact amount across its
//! own outputs. The body is signed as a unit; coinbase transactions carry
//! the nil sender, the zero input and the nil signature.

use crate::crypto::{hash_sum, Address, Hash, KeyError, Marshal, Signature, Wallet};
use crate::crypto::{NIL_ADDRESS, NIL_SIGNATURE};
use serde::{Deserialize, Serialize};

// =============================================================================
// Input pointer
// =============================================================================

/// Reference to a transaction already recorded on the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TxHashPointer {
    /// Number of the block holding the referenced transaction
    pub block_number: u32,
    /// Hash of the referenced transaction
    pub hash: Hash,
    /// Position of the referenced transaction within its block
    pub index: u32,
}

impl TxHashPointer {
    pub fn new(block_number: u32, hash: Hash, index: u32) -> Self {
        Self {
            block_number,
            hash,
            index,
        }
    }

    /// The all-zero pointer used by coinbase transactions
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.block_number == 0 && self.hash.is_zero() && self.index == 0
    }

    /// Hash of this pointer, used to key pending transactions
    pub fn key(&self) -> Hash {
        hash_sum(self)
    }
}

impl Marshal for TxHashPointer {
    fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&self.block_number.to_le_bytes());
        buf.extend_from_slice(self.hash.as_bytes());
        buf.extend_from_slice(&self.index.to_le_bytes());
        buf
    }
}

// =============================================================================
// Transaction Output
// =============================================================================

/// Transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in base units
    pub amount: u64,
    /// Recipient identity
    pub recipient: Address,
}

impl TxOutput {
    pub fn new(amount: u64, recipient: Address) -> Self {
        Self { amount, recipient }
    }

    /// Check if this output belongs to the given address
    pub fn is_owned_by(&self, address: &Address) -> bool {
        self.recipient == *address
    }
}

impl Marshal for TxOutput {
    fn marshal(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(72);
        buf.extend_from_slice(&self.amount.to_le_bytes());
        buf.extend_from_slice(self.recipient.as_bytes());
        buf
    }
}

// =============================================================================
// Transaction Body
// =============================================================================

/// The signed portion of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxBody {
    pub sender: Address,
    pub input: TxHashPointer,
    pub outputs: Vec<TxOutput>,
}

impl TxBody {
    pub fn new(sender: Address, input: TxHashPointer, outputs: Vec<TxOutput>) -> Self {
        Self {
            sender,
            input,
            outputs,
        }
    }
}

impl Marshal for TxBody {
    fn marshal(&self) -> Vec<u8> {
        let mut buf = self.sender.marshal();
        buf.extend(self.input.marshal());
        for output in &self.outputs {
            buf.extend(output.marshal());
        }
        buf
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A signed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub body: TxBody,
    pub sig: Signature,
}

impl Transaction {
    /// Sign `body` with `wallet`
    pub fn new_signed(body: TxBody, wallet: &dyn Wallet) -> Result<Self, KeyError> {
        let sig = wallet.sign(&hash_sum(&body))?;
        Ok(Self { body, sig })
    }

    /// Create a coinbase transaction paying `amount` to `recipient`
    pub fn coinbase(recipient: Address, amount: u64) -> Self {
        Self {
            body: TxBody {
                sender: NIL_ADDRESS,
                input: TxHashPointer::zero(),
                outputs: vec![TxOutput::new(amount, recipient)],
            },
            sig: NIL_SIGNATURE,
        }
    }

    pub fn sender(&self) -> &Address {
        &self.body.sender
    }

    pub fn input(&self) -> &TxHashPointer {
        &self.body.input
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.body.outputs
    }

    /// Identity of this transaction
    pub fn hash(&self) -> Hash {
        hash_sum(self)
    }

    /// Digest covered by the signature
    pub fn body_hash(&self) -> Hash {
        hash_sum(&self.body)
    }

    /// Whether the signature verifies against the declared sender
    pub fn verify_signature(&self) -> bool {
        self.body.sender.verify(&self.body_hash(), &self.sig)
    }

    /// Sum of all outputs, or `None` if it overflows
    pub fn total_output(&self) -> Option<u64> {
        self.body
            .outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
    }

    /// Sum of the outputs addressed to `address`, or `None` if it overflows
    pub fn total_to(&self, address: &Address) -> Option<u64> {
        self.body
            .outputs
            .iter()
            .filter(|o| o.is_owned_by(address))
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
    }

    /// Whether `other` consumes the same sender funds as this transaction
    pub fn spends_same_input(&self, other: &Transaction) -> bool {
        self.body.input == other.body.input && self.body.sender == other.body.sender
    }

    /// Encoded size in bytes
    pub fn size(&self) -> usize {
        self.marshal().len()
    }
}

impl Marshal for Transaction {
    fn marshal(&self) -> Vec<u8> {
        let mut buf = self.body.marshal();
        buf.extend(self.sig.marshal());
        buf
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyPair, ADDR_LEN, SIG_LEN};

    fn sample_body(sender: Address, recipient: Address) -> TxBody {
        let input = TxHashPointer::new(3, hash_sum(&TxHashPointer::zero()), 1);
        TxBody::new(
            sender,
            input,
            vec![TxOutput::new(30, recipient), TxOutput::new(20, sender)],
        )
    }

    #[test]
    fn test_coinbase_transaction() {
        let kp = KeyPair::generate();
        let tx = Transaction::coinbase(kp.address(), 50);
        assert!(tx.sender().is_nil());
        assert!(tx.input().is_zero());
        assert!(tx.sig.is_nil());
        assert_eq!(tx.total_output(), Some(50));
    }

    #[test]
    fn test_transaction_signing() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();

        let tx = Transaction::new_signed(sample_body(sender.address(), recipient.address()), &sender)
            .unwrap();
        assert!(tx.verify_signature());

        let forged =
            Transaction::new_signed(sample_body(sender.address(), recipient.address()), &recipient)
                .unwrap();
        assert!(!forged.verify_signature());
    }

    #[test]
    fn test_tampering_breaks_signature() {
        let sender = KeyPair::generate();
        let mut tx =
            Transaction::new_signed(sample_body(sender.address(), sender.address()), &sender)
                .unwrap();
        tx.body.outputs[0].amount += 1;
        assert!(!tx.verify_signature());
    }

    #[test]
    fn test_hash_survives_serde() {
        let sender = KeyPair::generate();
        let tx = Transaction::new_signed(sample_body(sender.address(), sender.address()), &sender)
            .unwrap();

        let json = serde_json::to_string(&tx).unwrap();
        let decoded: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, tx);
        assert_eq!(decoded.hash(), tx.hash());
    }

    #[test]
    fn test_encoded_size() {
        let tx = Transaction::coinbase(KeyPair::generate().address(), 1);
        // sender + pointer + one output + signature
        assert_eq!(tx.size(), ADDR_LEN + 40 + (8 + ADDR_LEN) + SIG_LEN);
    }

    #[test]
    fn test_totals() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();
        let tx = Transaction::new_signed(sample_body(sender.address(), recipient.address()), &sender)
            .unwrap();

        assert_eq!(tx.total_output(), Some(50));
        assert_eq!(tx.total_to(&recipient.address()), Some(30));
        assert_eq!(tx.total_to(&sender.address()), Some(20));

        let mut overflowing = tx.clone();
        overflowing.body.outputs[0].amount = u64::MAX;
        assert_eq!(overflowing.total_output(), None);
    }

    #[test]
    fn test_same_input_detection() {
        let sender = KeyPair::generate();
        let recipient = KeyPair::generate();
        let a = Transaction::new_signed(sample_body(sender.address(), recipient.address()), &sender)
            .unwrap();
        let mut b = a.clone();
        b.body.outputs[0].amount = 10;
        b.body.outputs[1].amount = 40;
        assert!(a.spends_same_input(&b));

        let mut c = a.clone();
        c.body.sender = recipient.address();
        assert!(!a.spends_same_input(&c));
    }
}
