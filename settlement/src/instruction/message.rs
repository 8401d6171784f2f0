//! Versioned (v0) message compilation.
//!
//! A wallet signs a message, not an instruction. Compiling collects every
//! account the instructions touch into one key table, orders it by role
//! and rewrites each instruction to index into that table:
//!
//! ```text
//!   0x80 ‖ header[3] ‖ keys ‖ blockhash[32] ‖ instructions ‖ lookups
//! ```
//!
//! Arrays are prefixed with a compact-u16 length. Address lookup tables
//! are never used, so the lookup array is always empty.

use crate::address::Address;
use crate::error::{SettlementError, SettlementResult};

use super::{AccountMeta, UnsignedInstruction};

/// High bit of the first byte marks a versioned message; low bits are 0.
pub const MESSAGE_VERSION_0: u8 = 0x80;

pub const SIGNATURE_LEN: usize = 64;

const MAX_ACCOUNT_KEYS: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub num_required_signatures: u8,
    pub num_readonly_signed: u8,
    pub num_readonly_unsigned: u8,
}

/// An instruction rewritten against the message's key table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_id_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

/// A compiled message. Only [`compile_message`] creates one, so every
/// array in it fits a compact-u16 length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledMessage {
    header: MessageHeader,
    account_keys: Vec<Address>,
    recent_blockhash: [u8; 32],
    instructions: Vec<CompiledInstruction>,
}

impl CompiledMessage {
    pub fn header(&self) -> MessageHeader {
        self.header
    }

    /// Fee payer first, then writable signers, readonly signers, writable
    /// and readonly accounts.
    pub fn account_keys(&self) -> &[Address] {
        &self.account_keys
    }

    pub fn recent_blockhash(&self) -> &[u8; 32] {
        &self.recent_blockhash
    }

    pub fn instructions(&self) -> &[CompiledInstruction] {
        &self.instructions
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_len_hint());
        buf.push(MESSAGE_VERSION_0);
        buf.push(self.header.num_required_signatures);
        buf.push(self.header.num_readonly_signed);
        buf.push(self.header.num_readonly_unsigned);

        write_short_len(&mut buf, self.account_keys.len() as u16);
        for key in &self.account_keys {
            buf.extend_from_slice(key.as_bytes());
        }
        buf.extend_from_slice(&self.recent_blockhash);

        write_short_len(&mut buf, self.instructions.len() as u16);
        for ix in &self.instructions {
            buf.push(ix.program_id_index);
            write_short_len(&mut buf, ix.accounts.len() as u16);
            buf.extend_from_slice(&ix.accounts);
            write_short_len(&mut buf, ix.data.len() as u16);
            buf.extend_from_slice(&ix.data);
        }

        // Address table lookups.
        write_short_len(&mut buf, 0);
        buf
    }

    /// The message behind one zeroed signature slot per required signer,
    /// ready for the wallet to fill in.
    pub fn to_unsigned_transaction(&self) -> Vec<u8> {
        let signers = self.header.num_required_signatures;
        let message = self.serialize();
        let mut buf = Vec::with_capacity(3 + signers as usize * SIGNATURE_LEN + message.len());
        write_short_len(&mut buf, u16::from(signers));
        buf.resize(buf.len() + signers as usize * SIGNATURE_LEN, 0);
        buf.extend_from_slice(&message);
        buf
    }

    fn serialized_len_hint(&self) -> usize {
        let instructions: usize = self
            .instructions
            .iter()
            .map(|ix| 7 + ix.accounts.len() + ix.data.len())
            .sum();
        4 + 3 + self.account_keys.len() * 32 + 32 + 3 + instructions + 1
    }
}

/// Compiles `instructions` into a v0 message paid for by `fee_payer`.
///
/// An account listed more than once keeps its first position and the union
/// of its flags. Program ids join the table as readonly non-signers.
pub fn compile_message(
    fee_payer: &Address,
    recent_blockhash: &str,
    instructions: &[UnsignedInstruction],
) -> SettlementResult<CompiledMessage> {
    let recent_blockhash = decode_blockhash(recent_blockhash)?;

    let mut metas = vec![AccountMeta::writable_signer(*fee_payer)];
    for ix in instructions {
        for meta in ix.accounts() {
            merge_account(&mut metas, *meta);
        }
        merge_account(&mut metas, AccountMeta::readonly(*ix.program_id()));
    }
    if metas.len() > MAX_ACCOUNT_KEYS {
        return Err(SettlementError::invalid_input(
            "instructions",
            format!("{} accounts, a message holds at most {MAX_ACCOUNT_KEYS}", metas.len()),
        ));
    }
    // Stable, so the fee payer stays in front of the other writable signers.
    metas.sort_by_key(|meta| match (meta.is_signer, meta.is_writable) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    });

    let count = |pred: fn(&AccountMeta) -> bool| metas.iter().filter(|m| pred(m)).count() as u8;
    let header = MessageHeader {
        num_required_signatures: count(|m| m.is_signer),
        num_readonly_signed: count(|m| m.is_signer && !m.is_writable),
        num_readonly_unsigned: count(|m| !m.is_signer && !m.is_writable),
    };

    let account_keys: Vec<Address> = metas.iter().map(|m| m.address).collect();
    // Every address was merged into the table above.
    let index_of = |address: &Address| -> u8 {
        account_keys
            .iter()
            .position(|key| key == address)
            .map_or(0, |i| i as u8)
    };

    let mut compiled = Vec::with_capacity(instructions.len());
    for ix in instructions {
        if ix.accounts().len() > u16::MAX as usize || ix.data().len() > u16::MAX as usize {
            return Err(SettlementError::invalid_input(
                "instructions",
                format!("instruction for {} does not fit a message", ix.program_id()),
            ));
        }
        compiled.push(CompiledInstruction {
            program_id_index: index_of(ix.program_id()),
            accounts: ix.accounts().iter().map(|m| index_of(&m.address)).collect(),
            data: ix.data().to_vec(),
        });
    }

    Ok(CompiledMessage {
        header,
        account_keys,
        recent_blockhash,
        instructions: compiled,
    })
}

/// Compiles and serializes in one go, with zeroed signature slots.
pub fn serialize_unsigned_transaction(
    fee_payer: &Address,
    recent_blockhash: &str,
    instructions: &[UnsignedInstruction],
) -> SettlementResult<Vec<u8>> {
    Ok(compile_message(fee_payer, recent_blockhash, instructions)?.to_unsigned_transaction())
}

fn merge_account(metas: &mut Vec<AccountMeta>, meta: AccountMeta) {
    match metas.iter_mut().find(|m| m.address == meta.address) {
        Some(existing) => {
            existing.is_signer |= meta.is_signer;
            existing.is_writable |= meta.is_writable;
        }
        None => metas.push(meta),
    }
}

fn decode_blockhash(encoded: &str) -> SettlementResult<[u8; 32]> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| SettlementError::invalid_input("recent blockhash", e.to_string()))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        SettlementError::invalid_input(
            "recent blockhash",
            format!("expected 32 bytes, got {}", bytes.len()),
        )
    })
}

/// Seven bits per byte, low bits first; the high bit means more follow.
fn write_short_len(buf: &mut Vec<u8>, len: u16) {
    let mut rem = len;
    loop {
        let byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new_from_array([n; 32])
    }

    fn blockhash() -> String {
        bs58::encode([5u8; 32]).into_string()
    }

    #[test]
    fn short_len_encoding() {
        let encode = |len: u16| {
            let mut buf = Vec::new();
            write_short_len(&mut buf, len);
            buf
        };
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(0x7f), vec![0x7f]);
        assert_eq!(encode(0x80), vec![0x80, 0x01]);
        assert_eq!(encode(0x3fff), vec![0xff, 0x7f]);
        assert_eq!(encode(0x4000), vec![0x80, 0x80, 0x01]);
        assert_eq!(encode(u16::MAX), vec![0xff, 0xff, 0x03]);
    }

    #[test]
    fn single_instruction_message_bytes() {
        let ix = UnsignedInstruction::new(
            addr(9),
            vec![
                AccountMeta::writable_signer(addr(1)),
                AccountMeta::writable(addr(2)),
                AccountMeta::readonly(addr(3)),
            ],
            vec![7, 8],
        );
        let message = compile_message(&addr(1), &blockhash(), &[ix.clone()]).unwrap();

        let mut expected = vec![0x80, 1, 0, 2, 4];
        for n in [1u8, 2, 3, 9] {
            expected.extend_from_slice(&[n; 32]);
        }
        expected.extend_from_slice(&[5u8; 32]);
        expected.extend_from_slice(&[1, 3, 3, 0, 1, 2, 2, 7, 8, 0]);
        assert_eq!(message.serialize(), expected);

        let tx = serialize_unsigned_transaction(&addr(1), &blockhash(), &[ix]).unwrap();
        assert_eq!(tx[0], 1);
        assert!(tx[1..65].iter().all(|&b| b == 0));
        assert_eq!(&tx[65..], expected.as_slice());
    }

    #[test]
    fn keys_are_merged_and_ordered_by_role() {
        let first = UnsignedInstruction::new(
            addr(9),
            vec![
                AccountMeta::readonly(addr(4)),
                AccountMeta::writable(addr(2)),
                AccountMeta {
                    address: addr(5),
                    is_signer: true,
                    is_writable: false,
                },
                AccountMeta::readonly(addr(1)),
            ],
            vec![1],
        );
        let second = UnsignedInstruction::new(
            addr(8),
            vec![
                AccountMeta::readonly(addr(2)),
                AccountMeta::writable(addr(4)),
                AccountMeta::readonly(addr(9)),
            ],
            vec![],
        );

        let message = compile_message(&addr(1), &blockhash(), &[first, second]).unwrap();
        assert_eq!(
            message.account_keys(),
            &[addr(1), addr(5), addr(4), addr(2), addr(9), addr(8)]
        );
        assert_eq!(
            message.header(),
            MessageHeader {
                num_required_signatures: 2,
                num_readonly_signed: 1,
                num_readonly_unsigned: 2,
            }
        );
        assert_eq!(message.instructions()[0].program_id_index, 4);
        assert_eq!(message.instructions()[0].accounts, vec![2, 3, 1, 0]);
        assert_eq!(message.instructions()[1].program_id_index, 5);
        assert_eq!(message.instructions()[1].accounts, vec![3, 2, 4]);

        let tx = message.to_unsigned_transaction();
        assert_eq!(tx[0], 2);
        assert_eq!(tx.len(), 1 + 2 * SIGNATURE_LEN + message.serialize().len());
    }

    #[test]
    fn fee_payer_alone_still_signs() {
        let message = compile_message(&addr(1), &blockhash(), &[]).unwrap();
        assert_eq!(message.account_keys(), &[addr(1)]);
        assert_eq!(message.header().num_required_signatures, 1);
        assert_eq!(message.serialize().len(), 1 + 3 + 1 + 32 + 32 + 1 + 1);
    }

    #[test]
    fn bad_blockhash_is_rejected() {
        let short = bs58::encode([1u8; 31]).into_string();
        for hash in ["", "0OIl", short.as_str()] {
            assert!(matches!(
                compile_message(&addr(1), hash, &[]),
                Err(SettlementError::InvalidInput {
                    field: "recent blockhash",
                    ..
                })
            ));
        }
    }
}
