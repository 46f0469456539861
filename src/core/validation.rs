//! Validity rules for transactions and blocks
//!
//! Every check returns `(valid, code)`. A rejected transaction or block is
//! an expected outcome (stale or hostile peer data), so failures are
//! reported as closed code sets instead of errors. Checks run in a fixed
//! order and the first failing check decides the code.

use crate::consensus::{MAX_TARGET, MIN_TARGET};
use crate::core::block::Block;
use crate::core::blockchain::BlockChain;
use crate::core::transaction::{Transaction, TxHashPointer};
use crate::crypto::Hash;
use log::debug;
use std::collections::HashMap;
use std::fmt;

macro_rules! display_as_debug {
    ($($code:ty),*) => {
        $(impl fmt::Display for $code {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        })*
    };
}

/// Outcome of [`valid_transaction`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionCode {
    ValidTransaction,
    NilTransaction,
    NoInputTransaction,
    Overspend,
    BadSig,
    Respend,
}

/// Outcome of [`valid_cloud_base`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudBaseTransactionCode {
    ValidCloudBaseTransaction,
    NilCloudBaseTransaction,
    BadCloudBaseSender,
    BadCloudBaseInput,
    BadCloudBaseOutput,
    BadCloudBaseReward,
    BadCloudBaseRecipient,
    BadCloudBaseSig,
}

/// Outcome of [`valid_genesis_block`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenesisBlockCode {
    ValidGenesisBlock,
    NilGenesisBlock,
    BadGenesisBlockNumber,
    NotFirstBlock,
    BadGenesisLastBlock,
    BadGenesisTransactions,
    BadGenesisCloudBase,
    BadGenesisTarget,
    BadGenesisTime,
}

/// Outcome of [`valid_block`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockCode {
    ValidBlock,
    NilBlock,
    BadGenesisBlock,
    BadBlockNumber,
    BadCloudBaseTransaction,
    BadTransaction,
    BadTarget,
    BadTime,
    BadHash,
    DoubleSpend,
    /// Recorded block whose hash does not meet its own target
    BadProofOfWork,
}

display_as_debug!(TransactionCode, CloudBaseTransactionCode, GenesisBlockCode, BlockCode);

/// Whether `target` lies within the allowed target range
pub fn valid_target(target: &Hash) -> bool {
    *target >= MIN_TARGET && *target <= MAX_TARGET
}

/// Validate a free-standing transaction against the whole chain.
pub fn valid_transaction(chain: &BlockChain, tx: Option<&Transaction>) -> (bool, TransactionCode) {
    let stop = chain.len().min(u32::MAX as usize) as u32;
    check_transaction(chain, tx, stop)
}

/// Transaction rules with the respend scan ending before block `stop`.
fn check_transaction(
    chain: &BlockChain,
    tx: Option<&Transaction>,
    stop: u32,
) -> (bool, TransactionCode) {
    let Some(tx) = tx else {
        return (false, TransactionCode::NilTransaction);
    };

    // Inputs resolve only within the blocks preceding `stop`
    let input_tx = match chain.get_input_transaction(tx.input()) {
        Some(input_tx) if tx.input().block_number < stop && input_tx.hash() == tx.input().hash => {
            input_tx
        }
        _ => {
            debug!("No input transaction at {:?}", tx.input());
            return (false, TransactionCode::NoInputTransaction);
        }
    };

    match (input_tx.total_to(tx.sender()), tx.total_output()) {
        (Some(available), Some(spent)) if available == spent => {}
        (available, spent) => {
            debug!(
                "Overspend by {}: inputs {:?}, outputs {:?}",
                tx.sender(),
                available,
                spent
            );
            return (false, TransactionCode::Overspend);
        }
    }

    if !tx.verify_signature() {
        debug!("Bad signature from {}", tx.sender());
        return (false, TransactionCode::BadSig);
    }

    if let Some((block, index)) = chain.contains_transaction(tx, tx.input().block_number, stop) {
        debug!("Input already spent in block {} at index {}", block, index);
        return (false, TransactionCode::Respend);
    }

    (true, TransactionCode::ValidTransaction)
}

/// Validate a coinbase transaction.
pub fn valid_cloud_base(tx: Option<&Transaction>) -> (bool, CloudBaseTransactionCode) {
    use CloudBaseTransactionCode::*;

    let Some(tx) = tx else {
        return (false, NilCloudBaseTransaction);
    };

    if !tx.sender().is_nil() {
        return (false, BadCloudBaseSender);
    }
    if !tx.input().is_zero() {
        return (false, BadCloudBaseInput);
    }
    let [output] = tx.outputs() else {
        return (false, BadCloudBaseOutput);
    };
    if output.amount == 0 {
        return (false, BadCloudBaseReward);
    }
    if output.recipient.is_nil() {
        return (false, BadCloudBaseRecipient);
    }
    if !tx.sig.is_nil() {
        return (false, BadCloudBaseSig);
    }

    (true, ValidCloudBaseTransaction)
}

/// Validate the genesis block, which must already be the chain's first block.
pub fn valid_genesis_block(chain: &BlockChain, gb: Option<&Block>) -> (bool, GenesisBlockCode) {
    use GenesisBlockCode::*;

    let Some(gb) = gb else {
        return (false, NilGenesisBlock);
    };

    if gb.block_number() != 0 {
        return (false, BadGenesisBlockNumber);
    }
    if chain.blocks.first() != Some(gb) {
        return (false, NotFirstBlock);
    }
    if !gb.header.last_block.is_zero() {
        return (false, BadGenesisLastBlock);
    }
    if gb.transactions.len() != 1 {
        return (false, BadGenesisTransactions);
    }
    if !valid_cloud_base(gb.coinbase()).0 {
        return (false, BadGenesisCloudBase);
    }
    if !valid_target(&gb.header.target) {
        return (false, BadGenesisTarget);
    }
    if gb.header.time == 0 {
        return (false, BadGenesisTime);
    }

    (true, ValidGenesisBlock)
}

/// Validate a block against the blocks preceding it.
///
/// The block may be the next block to append or one already on the chain.
pub fn valid_block(chain: &BlockChain, b: Option<&Block>) -> (bool, BlockCode) {
    use BlockCode::*;

    let Some(b) = b else {
        return (false, NilBlock);
    };

    if b.is_genesis() {
        let (valid, code) = valid_genesis_block(chain, Some(b));
        if !valid {
            debug!("Invalid genesis block: {}", code);
            return (false, BadGenesisBlock);
        }
        return (true, ValidBlock);
    }

    let number = b.block_number();
    let Some(previous) = (number as usize <= chain.len())
        .then(|| chain.get_block(number - 1))
        .flatten()
    else {
        return (false, BadBlockNumber);
    };
    if previous.block_number().checked_add(1) != Some(number) {
        return (false, BadBlockNumber);
    }

    let (valid_coinbase, code) = valid_cloud_base(b.coinbase());
    if !valid_coinbase {
        debug!("Block {} has bad coinbase: {}", number, code);
        return (false, BadCloudBaseTransaction);
    }

    for tx in b.transactions.iter().skip(1) {
        let (valid, code) = check_transaction(chain, Some(tx), number);
        if !valid {
            debug!("Block {} has bad transaction {}: {}", number, tx.hash(), code);
            return (false, BadTransaction);
        }
    }

    if !valid_target(&b.header.target) {
        return (false, BadTarget);
    }
    if b.header.time == 0 {
        return (false, BadTime);
    }
    if previous.hash() != b.header.last_block {
        return (false, BadHash);
    }
    if has_double_spend(chain, &b.transactions[1..]) {
        return (false, DoubleSpend);
    }

    (true, ValidBlock)
}

/// Chain-independent block checks run before proof-of-work search.
pub fn valid_block_structure(b: &Block) -> (bool, BlockCode) {
    if !valid_cloud_base(b.coinbase()).0 {
        return (false, BlockCode::BadCloudBaseTransaction);
    }
    if !valid_target(&b.header.target) {
        return (false, BlockCode::BadTarget);
    }
    if b.header.time == 0 {
        return (false, BlockCode::BadTime);
    }
    (true, BlockCode::ValidBlock)
}

/// Transactions sharing an input must come from different senders and may
/// not claim more than the input transaction paid out in total.
fn has_double_spend(chain: &BlockChain, transactions: &[Transaction]) -> bool {
    let mut by_input: HashMap<TxHashPointer, Vec<&Transaction>> = HashMap::new();
    for tx in transactions {
        by_input.entry(*tx.input()).or_default().push(tx);
    }

    for (input, group) in by_input.iter().filter(|(_, g)| g.len() > 1) {
        for (i, a) in group.iter().enumerate() {
            if group[i + 1..].iter().any(|b| a.sender() == b.sender()) {
                return true;
            }
        }

        let Some(input_tx) = chain.get_input_transaction(input) else {
            return true;
        };
        let claimed = group
            .iter()
            .try_fold(0u64, |acc, tx| acc.checked_add(tx.total_output()?));
        match (claimed, input_tx.total_output()) {
            (Some(claimed), Some(available)) if claimed <= available => {}
            _ => return true,
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BlockHeader;
    use crate::core::transaction::TxOutput;
    use crate::crypto::{KeyPair, Signature, Wallet, NIL_ADDRESS};
    use crate::testutil::*;

    // ---- transactions ----------------------------------------------------

    #[test]
    fn test_valid_transaction() {
        let fx = Fixture::new();
        let tx = fx.alice_pays_bob(30);
        assert_eq!(
            valid_transaction(&fx.chain, Some(&tx)),
            (true, TransactionCode::ValidTransaction)
        );
    }

    #[test]
    fn test_nil_transaction() {
        let fx = Fixture::new();
        assert_eq!(
            valid_transaction(&fx.chain, None),
            (false, TransactionCode::NilTransaction)
        );
    }

    #[test]
    fn test_missing_input_transaction() {
        let fx = Fixture::new();

        let out_of_range = TxHashPointer::new(5, fx.funding.hash(), 0);
        let tx = signed(&fx.alice, out_of_range, vec![TxOutput::new(STARTING_REWARD, fx.bob.address())]);
        assert_eq!(
            valid_transaction(&fx.chain, Some(&tx)),
            (false, TransactionCode::NoInputTransaction)
        );

        let wrong_hash = TxHashPointer::new(0, Hash::zero(), 0);
        let tx = signed(&fx.alice, wrong_hash, vec![TxOutput::new(STARTING_REWARD, fx.bob.address())]);
        assert_eq!(
            valid_transaction(&fx.chain, Some(&tx)),
            (false, TransactionCode::NoInputTransaction)
        );
    }

    #[test]
    fn test_overspend_rejected() {
        let fx = Fixture::new();
        let tx = signed(
            &fx.alice,
            fx.funding_pointer(),
            vec![TxOutput::new(STARTING_REWARD + 1, fx.bob.address())],
        );
        assert_eq!(
            valid_transaction(&fx.chain, Some(&tx)),
            (false, TransactionCode::Overspend)
        );
    }

    #[test]
    fn test_overflowing_outputs_rejected() {
        let fx = Fixture::new();
        let tx = signed(
            &fx.alice,
            fx.funding_pointer(),
            vec![
                TxOutput::new(u64::MAX, fx.bob.address()),
                TxOutput::new(STARTING_REWARD + 1, fx.bob.address()),
            ],
        );
        assert_eq!(
            valid_transaction(&fx.chain, Some(&tx)),
            (false, TransactionCode::Overspend)
        );
    }

    #[test]
    fn test_spending_someone_elses_output() {
        let fx = Fixture::new();
        // Bob has nothing in the funding transaction
        let tx = signed(
            &fx.bob,
            fx.funding_pointer(),
            vec![TxOutput::new(STARTING_REWARD, fx.bob.address())],
        );
        assert_eq!(
            valid_transaction(&fx.chain, Some(&tx)),
            (false, TransactionCode::Overspend)
        );
    }

    #[test]
    fn test_bad_signature() {
        let fx = Fixture::new();
        let mut tx = fx.alice_pays_bob(30);
        tx.sig = fx.bob.sign(&tx.body_hash()).unwrap();
        assert_eq!(
            valid_transaction(&fx.chain, Some(&tx)),
            (false, TransactionCode::BadSig)
        );
    }

    #[test]
    fn test_respend_rejected() {
        let mut fx = Fixture::new();
        let tx = fx.alice_pays_bob(30);
        let block = fx.candidate(vec![tx.clone()]);
        fx.chain.append_block(block);

        assert_eq!(
            valid_transaction(&fx.chain, Some(&tx)),
            (false, TransactionCode::Respend)
        );

        let resplit = fx.alice_pays_bob(10);
        assert_eq!(
            valid_transaction(&fx.chain, Some(&resplit)),
            (false, TransactionCode::Respend)
        );
    }

    #[test]
    fn test_recipient_can_spend_change_and_payment() {
        let mut fx = Fixture::new();
        let tx = fx.alice_pays_bob(30);
        let block = fx.candidate(vec![tx.clone()]);
        fx.chain.append_block(block);

        let pointer = TxHashPointer::new(1, tx.hash(), 1);
        let bob_spend = signed(&fx.bob, pointer, vec![TxOutput::new(30, fx.alice.address())]);
        let alice_spend = signed(&fx.alice, pointer, vec![TxOutput::new(20, fx.bob.address())]);

        assert!(valid_transaction(&fx.chain, Some(&bob_spend)).0);
        assert!(valid_transaction(&fx.chain, Some(&alice_spend)).0);
    }

    // ---- coinbase --------------------------------------------------------

    #[test]
    fn test_valid_cloud_base() {
        let tx = Transaction::coinbase(KeyPair::generate().address(), 1);
        assert_eq!(
            valid_cloud_base(Some(&tx)),
            (true, CloudBaseTransactionCode::ValidCloudBaseTransaction)
        );
    }

    #[test]
    fn test_bad_cloud_base_codes() {
        use CloudBaseTransactionCode::*;
        let kp = KeyPair::generate();
        let good = Transaction::coinbase(kp.address(), 10);

        assert_eq!(valid_cloud_base(None), (false, NilCloudBaseTransaction));

        let mut tx = good.clone();
        tx.body.sender = kp.address();
        assert_eq!(valid_cloud_base(Some(&tx)), (false, BadCloudBaseSender));

        let mut tx = good.clone();
        tx.body.input.index = 1;
        assert_eq!(valid_cloud_base(Some(&tx)), (false, BadCloudBaseInput));

        let mut tx = good.clone();
        tx.body.outputs.push(TxOutput::new(1, kp.address()));
        assert_eq!(valid_cloud_base(Some(&tx)), (false, BadCloudBaseOutput));

        let mut tx = good.clone();
        tx.body.outputs.clear();
        assert_eq!(valid_cloud_base(Some(&tx)), (false, BadCloudBaseOutput));

        let mut tx = good.clone();
        tx.body.outputs[0].amount = 0;
        assert_eq!(valid_cloud_base(Some(&tx)), (false, BadCloudBaseReward));

        let mut tx = good.clone();
        tx.body.outputs[0].recipient = NIL_ADDRESS;
        assert_eq!(valid_cloud_base(Some(&tx)), (false, BadCloudBaseRecipient));

        let mut tx = good.clone();
        tx.sig = kp.sign(&tx.body_hash()).unwrap();
        assert_eq!(valid_cloud_base(Some(&tx)), (false, BadCloudBaseSig));
    }

    // ---- genesis ---------------------------------------------------------

    #[test]
    fn test_valid_genesis_block() {
        let fx = Fixture::new();
        let genesis = fx.chain.blocks[0].clone();
        assert_eq!(
            valid_genesis_block(&fx.chain, Some(&genesis)),
            (true, GenesisBlockCode::ValidGenesisBlock)
        );
        assert_eq!(
            valid_block(&fx.chain, Some(&genesis)),
            (true, BlockCode::ValidBlock)
        );
    }

    #[test]
    fn test_bad_genesis_codes() {
        use GenesisBlockCode::*;
        let fx = Fixture::new();
        let genesis = fx.chain.blocks[0].clone();

        assert_eq!(valid_genesis_block(&fx.chain, None), (false, NilGenesisBlock));

        let other = Block::genesis(fx.bob.address(), STARTING_REWARD, MAX_TARGET);
        assert_eq!(
            valid_genesis_block(&fx.chain, Some(&other)),
            (false, NotFirstBlock)
        );

        let mut wrong_number = genesis.clone();
        wrong_number.header.block_number = 1;
        assert_eq!(
            valid_genesis_block(&fx.chain, Some(&wrong_number)),
            (false, BadGenesisBlockNumber)
        );

        // The remaining rules need the tampered block to sit at index zero
        let cases: Vec<(Box<dyn Fn(&mut Block)>, GenesisBlockCode)> = vec![
            (
                Box::new(|b: &mut Block| b.header.last_block = b.hash()),
                BadGenesisLastBlock,
            ),
            (
                Box::new(|b: &mut Block| b.transactions.push(b.transactions[0].clone())),
                BadGenesisTransactions,
            ),
            (
                Box::new(|b: &mut Block| b.transactions[0].sig = Signature::new([1; 64])),
                BadGenesisCloudBase,
            ),
            (
                Box::new(|b: &mut Block| b.header.target = Hash::zero()),
                BadGenesisTarget,
            ),
            (Box::new(|b: &mut Block| b.header.time = 0), BadGenesisTime),
        ];

        for (tamper, expected) in cases {
            let mut block = genesis.clone();
            tamper(&mut block);
            let chain = BlockChain::with_genesis(block.clone());
            assert_eq!(valid_genesis_block(&chain, Some(&block)), (false, expected));
            assert_eq!(
                valid_block(&chain, Some(&block)),
                (false, BlockCode::BadGenesisBlock)
            );
        }
    }

    // ---- blocks ----------------------------------------------------------

    #[test]
    fn test_two_block_chain_end_to_end() {
        let fx = Fixture::new();
        let tx = fx.alice_pays_bob(30);
        let block = fx.candidate(vec![tx]);

        assert_eq!(valid_block(&fx.chain, Some(&block)), (true, BlockCode::ValidBlock));

        let mut tampered = block.clone();
        tampered.transactions[1].body.outputs[0].amount += 1;
        assert_eq!(
            valid_block(&fx.chain, Some(&tampered)),
            (false, BlockCode::BadTransaction)
        );
        assert_eq!(
            valid_transaction(&fx.chain, Some(&tampered.transactions[1])),
            (false, TransactionCode::Overspend)
        );
    }

    #[test]
    fn test_appended_block_still_validates() {
        let mut fx = Fixture::new();
        let tx = fx.alice_pays_bob(30);
        let block = fx.candidate(vec![tx]);
        fx.chain.append_block(block.clone());

        assert_eq!(valid_block(&fx.chain, Some(&block)), (true, BlockCode::ValidBlock));
        assert!(fx.chain.verify().is_ok());
    }

    #[test]
    fn test_input_from_a_later_block_rejected() {
        let mut fx = Fixture::new();
        // Every coinbase paying Alice the same reward hashes identically
        let later_coinbase = Transaction::coinbase(fx.alice.address(), STARTING_REWARD);
        let spend = signed(
            &fx.alice,
            TxHashPointer::new(2, later_coinbase.hash(), 0),
            vec![TxOutput::new(STARTING_REWARD, fx.bob.address())],
        );

        let early = fx.candidate(vec![spend.clone()]);
        assert_eq!(valid_block(&fx.chain, Some(&early)), (false, BlockCode::BadTransaction));

        fx.chain.append_block(early.clone());
        let block = fx.candidate(vec![]);
        fx.chain.append_block(block);
        let repeat = fx.candidate(vec![spend.clone()]);
        fx.chain.append_block(repeat.clone());

        assert_eq!(valid_block(&fx.chain, Some(&early)), (false, BlockCode::BadTransaction));
        assert_eq!(valid_block(&fx.chain, Some(&repeat)), (true, BlockCode::ValidBlock));
        assert_eq!(fx.chain.verify(), Err((1, BlockCode::BadTransaction)));
    }

    #[test]
    fn test_nil_block() {
        let fx = Fixture::new();
        assert_eq!(valid_block(&fx.chain, None), (false, BlockCode::NilBlock));
    }

    #[test]
    fn test_bad_block_number() {
        let fx = Fixture::new();
        let mut block = fx.candidate(vec![]);
        block.header.block_number = 2;
        assert_eq!(
            valid_block(&fx.chain, Some(&block)),
            (false, BlockCode::BadBlockNumber)
        );
    }

    #[test]
    fn test_bad_coinbase_in_block() {
        let fx = Fixture::new();
        let mut block = fx.candidate(vec![]);
        block.transactions[0].body.outputs[0].amount = 0;
        assert_eq!(
            valid_block(&fx.chain, Some(&block)),
            (false, BlockCode::BadCloudBaseTransaction)
        );

        let mut empty = fx.candidate(vec![]);
        empty.transactions.clear();
        assert_eq!(
            valid_block(&fx.chain, Some(&empty)),
            (false, BlockCode::BadCloudBaseTransaction)
        );
    }

    #[test]
    fn test_bad_target_time_and_hash() {
        let fx = Fixture::new();

        let mut block = fx.candidate(vec![]);
        block.header.target = Hash::zero();
        assert_eq!(valid_block(&fx.chain, Some(&block)), (false, BlockCode::BadTarget));

        let mut block = fx.candidate(vec![]);
        block.header.time = 0;
        assert_eq!(valid_block(&fx.chain, Some(&block)), (false, BlockCode::BadTime));

        let mut block = fx.candidate(vec![]);
        block.header.last_block = Hash::zero();
        assert_eq!(valid_block(&fx.chain, Some(&block)), (false, BlockCode::BadHash));
    }

    #[test]
    fn test_double_spend_within_block() {
        let fx = Fixture::new();
        let first = fx.alice_pays_bob(30);
        let second = fx.alice_pays_bob(20);
        let block = fx.candidate(vec![first, second]);
        assert_eq!(
            valid_block(&fx.chain, Some(&block)),
            (false, BlockCode::DoubleSpend)
        );
    }

    #[test]
    fn test_shared_input_from_different_senders() {
        let mut fx = Fixture::new();
        let tx = fx.alice_pays_bob(30);
        let block = fx.candidate(vec![tx.clone()]);
        fx.chain.append_block(block);

        let pointer = TxHashPointer::new(1, tx.hash(), 1);
        let bob_spend = signed(&fx.bob, pointer, vec![TxOutput::new(30, fx.alice.address())]);
        let alice_spend = signed(&fx.alice, pointer, vec![TxOutput::new(20, fx.bob.address())]);

        let block = fx.candidate(vec![bob_spend, alice_spend]);
        assert_eq!(valid_block(&fx.chain, Some(&block)), (true, BlockCode::ValidBlock));
    }

    #[test]
    fn test_structure_check() {
        let fx = Fixture::new();
        let block = fx.candidate(vec![]);
        assert_eq!(valid_block_structure(&block), (true, BlockCode::ValidBlock));

        let mut no_time = block.clone();
        no_time.header = BlockHeader { time: 0, ..block.header.clone() };
        assert_eq!(valid_block_structure(&no_time), (false, BlockCode::BadTime));
    }

    #[test]
    fn test_target_bounds() {
        assert!(valid_target(&MIN_TARGET));
        assert!(valid_target(&MAX_TARGET));
        assert!(!valid_target(&Hash::zero()));
    }

    #[test]
    fn test_codes_display_their_names() {
        assert_eq!(TransactionCode::Respend.to_string(), "Respend");
        assert_eq!(BlockCode::DoubleSpend.to_string(), "DoubleSpend");
    }
}
