//! Legacy transaction wire format for the delegated token transfer.
//!
//! One instruction per transaction: token-program `Transfer` with the
//! facilitator as delegate authority and fee payer. Account ordering follows
//! the message format's requirement — writable signers, then writable
//! non-signers, then readonly non-signers.

use ed25519_dalek::{Signer, SigningKey};

/// The canonical SPL token program.
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Instruction tag for `Transfer { amount }` in the token program.
const TRANSFER_TAG: u8 = 3;

/// Everything needed to compile the transfer message.
pub struct TransferParams {
    /// Delegate authority and fee payer (the facilitator).
    pub authority: [u8; 32],
    /// Payer's token account.
    pub source: [u8; 32],
    /// Payee's token account.
    pub destination: [u8; 32],
    pub token_program: [u8; 32],
    pub amount: u64,
}

/// Shortvec length prefix: u16 in 7-bit groups, little-endian, high bit as
/// continuation.
pub fn encode_compact_u16(mut value: u16, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Compile the single-instruction transfer message.
///
/// Layout: header `[1, 0, 1]` (one required signature, no readonly signed
/// accounts, the token program readonly unsigned), the four account keys,
/// the recent blockhash, and one compiled instruction.
pub fn build_transfer_message(params: &TransferParams, recent_blockhash: &[u8; 32]) -> Vec<u8> {
    let mut message = Vec::with_capacity(192);

    // Header
    message.extend_from_slice(&[1, 0, 1]);

    // Account keys: authority (writable signer), source, destination
    // (writable), token program (readonly).
    encode_compact_u16(4, &mut message);
    message.extend_from_slice(&params.authority);
    message.extend_from_slice(&params.source);
    message.extend_from_slice(&params.destination);
    message.extend_from_slice(&params.token_program);

    message.extend_from_slice(recent_blockhash);

    // One instruction: Transfer { amount } on the token program, accounts
    // [source, destination, authority].
    encode_compact_u16(1, &mut message);
    message.push(3); // program id index
    encode_compact_u16(3, &mut message);
    message.extend_from_slice(&[1, 2, 0]);
    let mut data = Vec::with_capacity(9);
    data.push(TRANSFER_TAG);
    data.extend_from_slice(&params.amount.to_le_bytes());
    encode_compact_u16(data.len() as u16, &mut message);
    message.extend_from_slice(&data);

    message
}

/// Sign a compiled message and wrap it into the full transaction bytes.
pub fn sign_transaction(message: &[u8], key: &SigningKey) -> Vec<u8> {
    let signature = key.sign(message);

    let mut tx = Vec::with_capacity(1 + 64 + message.len());
    encode_compact_u16(1, &mut tx);
    tx.extend_from_slice(&signature.to_bytes());
    tx.extend_from_slice(message);
    tx
}
