//! Tempo transaction envelope (type `0x76`) codec.
//!
//! Layout:
//!
//! ```text
//! 0x76 || rlp([
//!   chain_id, max_priority_fee_per_gas, max_fee_per_gas, gas_limit,
//!   calls: [[to, value, input], ...],
//!   access_list, nonce_key, nonce, valid_before, valid_after,
//!   fee_token, fee_payer, authorization_list, key_authorization,
//!   sender_signature,
//! ])
//! ```
//!
//! Absent optional scalars are the RLP empty string. The fee payer slot is
//! empty, the single byte `0x00` (sponsorship requested) or a
//! `[y_parity, r, s]` list once the sponsor has co-signed. Access list,
//! authorization list and key authorization are carried as raw RLP and never
//! interpreted.

use alloy::primitives::{keccak256, Address, Bytes, Signature, B256, U256};
use alloy::rlp::{
    BufMut, Decodable, Encodable, Header, EMPTY_LIST_CODE, EMPTY_STRING_CODE,
};
use alloy::signers::SignerSync;
use alloy::sol_types::SolCall;
use thiserror::Error;

use crate::constants::{
    FEE_PAYER_DOMAIN_BYTE, TEMPO_TX_TYPE_BYTE, TRANSFER_CALLDATA_LEN, TRANSFER_SELECTOR,
};
use crate::{X402Error, TIP20};

/// Why a serialized transaction was not accepted as a single token transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionParseError {
    #[error("Invalid transaction type. Expected Tempo transaction (0x76)")]
    InvalidType,

    /// Structural decode failure (bad hex, bad RLP, missing fields).
    #[error("Failed to parse transaction: {0}")]
    Malformed(String),

    #[error("Transaction has no calls")]
    NoCalls,

    #[error("Transaction has multiple calls. Expected single token transfer")]
    MultipleCalls(usize),

    #[error("Call is not a token transfer. Expected transfer(address,uint256)")]
    NotTransfer,

    #[error("Invalid call data length. Expected 68 bytes, got {0}")]
    InvalidCallDataLength(usize),

    #[error("Call value must be 0 for token transfers")]
    NonZeroCallValue,

    #[error("Call has no target token contract")]
    MissingCallTarget,

    #[error("Transfer recipient is not a canonical address")]
    NonCanonicalRecipient,
}

impl TransactionParseError {
    /// True for structural failures, false for policy rejections of a
    /// well-formed envelope.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl From<alloy::rlp::Error> for TransactionParseError {
    fn from(err: alloy::rlp::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// One call inside a Tempo transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Call {
    /// `None` is contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
}

impl Call {
    /// A zero-value `transfer(to, value)` call on `token`.
    pub fn transfer(token: Address, to: Address, value: U256) -> Self {
        Self {
            to: Some(token),
            value: U256::ZERO,
            input: encode_transfer_call(to, value),
        }
    }
}

impl Encodable for Call {
    fn encode(&self, out: &mut dyn BufMut) {
        let mut payload = Vec::new();
        encode_optional(self.to, &mut payload);
        self.value.encode(&mut payload);
        self.input.encode(&mut payload);
        write_list(&payload, out);
    }
}

impl Decodable for Call {
    fn decode(buf: &mut &[u8]) -> alloy::rlp::Result<Self> {
        let mut body = list_body(buf)?;
        let call = Self {
            to: decode_optional_address(&mut body)?,
            value: U256::decode(&mut body)?,
            input: Bytes::decode(&mut body)?,
        };
        if !body.is_empty() {
            return Err(alloy::rlp::Error::Custom("unexpected fields in call"));
        }
        Ok(call)
    }
}

/// Fee sponsorship state of an envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeePayerSlot {
    /// The sender pays its own fees.
    #[default]
    None,
    /// The sender asks a fee payer to co-sign.
    Requested,
    /// Co-signed by the fee payer.
    Signed(Signature),
}

impl FeePayerSlot {
    pub fn is_sponsored(&self) -> bool {
        !matches!(self, Self::None)
    }

    fn encode(&self, out: &mut dyn BufMut) {
        match self {
            Self::None => out.put_u8(EMPTY_STRING_CODE),
            Self::Requested => out.put_u8(0x00),
            Self::Signed(sig) => {
                let mut payload = Vec::new();
                u8::from(sig.v()).encode(&mut payload);
                sig.r().encode(&mut payload);
                sig.s().encode(&mut payload);
                write_list(&payload, out);
            }
        }
    }

    fn decode(buf: &mut &[u8]) -> alloy::rlp::Result<Self> {
        match buf.first().copied() {
            None => Err(alloy::rlp::Error::InputTooShort),
            Some(EMPTY_STRING_CODE) => {
                skip_byte(buf);
                Ok(Self::None)
            }
            Some(0x00) => {
                skip_byte(buf);
                Ok(Self::Requested)
            }
            Some(b) if b >= EMPTY_LIST_CODE => {
                let mut body = list_body(buf)?;
                let y_parity = u8::decode(&mut body)?;
                let r = U256::decode(&mut body)?;
                let s = U256::decode(&mut body)?;
                if y_parity > 1 || !body.is_empty() {
                    return Err(alloy::rlp::Error::Custom("invalid fee payer signature"));
                }
                Ok(Self::Signed(Signature::new(r, s, y_parity == 1)))
            }
            Some(_) => Err(alloy::rlp::Error::Custom("invalid fee payer field")),
        }
    }
}

/// Unsigned Tempo transaction fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempoTransaction {
    pub chain_id: u64,
    pub max_priority_fee_per_gas: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub gas_limit: Option<u64>,
    pub calls: Vec<Call>,
    /// Raw RLP list.
    pub access_list: Bytes,
    /// 2-D nonce key; independent keys never contend for the same nonce.
    pub nonce_key: U256,
    pub nonce: u64,
    pub valid_before: Option<u64>,
    pub valid_after: Option<u64>,
    pub fee_token: Option<Address>,
    pub fee_payer: FeePayerSlot,
    /// Raw RLP list.
    pub authorization_list: Bytes,
    /// Raw RLP list, if present.
    pub key_authorization: Option<Bytes>,
}

impl Default for TempoTransaction {
    fn default() -> Self {
        Self {
            chain_id: 0,
            max_priority_fee_per_gas: None,
            max_fee_per_gas: None,
            gas_limit: None,
            calls: Vec::new(),
            access_list: Bytes::from_static(&[EMPTY_LIST_CODE]),
            nonce_key: U256::ZERO,
            nonce: 0,
            valid_before: None,
            valid_after: None,
            fee_token: None,
            fee_payer: FeePayerSlot::None,
            authorization_list: Bytes::from_static(&[EMPTY_LIST_CODE]),
            key_authorization: None,
        }
    }
}

/// How the fee payer slot is rendered while encoding.
enum FeePayerField<'a> {
    Slot(&'a FeePayerSlot),
    /// The fee payer's signing payload commits to the sender in this slot.
    Sender(Address),
}

impl TempoTransaction {
    /// Hash the sender signs.
    ///
    /// A sponsored envelope is hashed with the fee token blanked and the
    /// fee payer slot reduced to the request marker, so attaching the fee
    /// token and the sponsor's signature leaves this hash unchanged.
    pub fn sender_signing_hash(&self) -> B256 {
        let mut payload = Vec::new();
        if self.fee_payer.is_sponsored() {
            self.encode_fields(None, FeePayerField::Slot(&FeePayerSlot::Requested), &mut payload);
        } else {
            self.encode_fields(self.fee_token, FeePayerField::Slot(&self.fee_payer), &mut payload);
        }
        prefixed_list_hash(TEMPO_TX_TYPE_BYTE, &payload)
    }

    /// Hash the fee payer signs: commits to the fee token and the sender.
    pub fn fee_payer_signing_hash(&self, sender: Address) -> B256 {
        let mut payload = Vec::new();
        self.encode_fields(self.fee_token, FeePayerField::Sender(sender), &mut payload);
        prefixed_list_hash(FEE_PAYER_DOMAIN_BYTE, &payload)
    }

    /// Attach the sender's secp256k1 signature.
    pub fn into_signed(self, signature: Signature) -> SignedTempoTransaction {
        SignedTempoTransaction {
            tx: self,
            signature: Some(Bytes::copy_from_slice(&signature.as_bytes())),
        }
    }

    fn encode_fields(&self, fee_token: Option<Address>, fee_payer: FeePayerField<'_>, out: &mut Vec<u8>) {
        self.chain_id.encode(out);
        encode_optional(self.max_priority_fee_per_gas, out);
        encode_optional(self.max_fee_per_gas, out);
        encode_optional(self.gas_limit, out);

        let mut calls = Vec::new();
        for call in &self.calls {
            call.encode(&mut calls);
        }
        write_list(&calls, out);

        out.extend_from_slice(&self.access_list);
        self.nonce_key.encode(out);
        self.nonce.encode(out);
        encode_optional(self.valid_before, out);
        encode_optional(self.valid_after, out);
        encode_optional(fee_token, out);
        match fee_payer {
            FeePayerField::Slot(slot) => slot.encode(out),
            FeePayerField::Sender(sender) => sender.encode(out),
        }
        out.extend_from_slice(&self.authorization_list);
        match &self.key_authorization {
            Some(raw) => out.extend_from_slice(raw),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
    }
}

/// A decoded envelope as signed by its sender. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTempoTransaction {
    tx: TempoTransaction,
    signature: Option<Bytes>,
}

impl SignedTempoTransaction {
    /// Wrap fields with an arbitrary sender signature encoding.
    pub fn new(tx: TempoTransaction, signature: Option<Bytes>) -> Self {
        Self { tx, signature }
    }

    /// Decode `0x76 || rlp(...)` bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, TransactionParseError> {
        let Some((&ty, mut buf)) = bytes.split_first() else {
            return Err(TransactionParseError::InvalidType);
        };
        if ty != TEMPO_TX_TYPE_BYTE {
            return Err(TransactionParseError::InvalidType);
        }

        let mut body = list_body(&mut buf)?;
        if !buf.is_empty() {
            return Err(alloy::rlp::Error::Custom("trailing bytes after envelope").into());
        }

        let chain_id = u64::decode(&mut body)?;
        let max_priority_fee_per_gas = decode_optional_scalar::<u128>(&mut body)?;
        let max_fee_per_gas = decode_optional_scalar::<u128>(&mut body)?;
        let gas_limit = decode_optional_scalar::<u64>(&mut body)?;

        let mut calls_body = list_body(&mut body)?;
        let mut calls = Vec::new();
        while !calls_body.is_empty() {
            calls.push(Call::decode(&mut calls_body)?);
        }

        let access_list = take_raw_list(&mut body)?;
        let nonce_key = U256::decode(&mut body)?;
        let nonce = u64::decode(&mut body)?;
        let valid_before = decode_optional_scalar::<u64>(&mut body)?;
        let valid_after = decode_optional_scalar::<u64>(&mut body)?;
        let fee_token = decode_optional_address(&mut body)?;
        let fee_payer = FeePayerSlot::decode(&mut body)?;
        let authorization_list = take_raw_list(&mut body)?;

        // Key authorization is a list, a `0x80` placeholder, or left out
        // entirely, in which case a string here is already the signature.
        let key_authorization = match body.first().copied() {
            Some(b) if b >= EMPTY_LIST_CODE => Some(take_raw_list(&mut body)?),
            Some(EMPTY_STRING_CODE) => {
                body = &body[1..];
                None
            }
            _ => None,
        };

        let signature = if body.is_empty() {
            None
        } else {
            Some(Bytes::decode(&mut body)?).filter(|sig| !sig.is_empty())
        };
        if !body.is_empty() {
            return Err(alloy::rlp::Error::Custom("unexpected trailing fields").into());
        }

        Ok(Self {
            tx: TempoTransaction {
                chain_id,
                max_priority_fee_per_gas,
                max_fee_per_gas,
                gas_limit,
                calls,
                access_list,
                nonce_key,
                nonce,
                valid_before,
                valid_after,
                fee_token,
                fee_payer,
                authorization_list,
                key_authorization,
            },
            signature,
        })
    }

    /// Decode a hex string (with or without `0x`).
    pub fn decode_hex(serialized: &str) -> Result<Self, TransactionParseError> {
        let hex = serialized.strip_prefix("0x").unwrap_or(serialized);
        if !hex.starts_with("76") {
            return Err(TransactionParseError::InvalidType);
        }
        let bytes = alloy::hex::decode(hex)
            .map_err(|e| TransactionParseError::Malformed(format!("invalid hex: {e}")))?;
        Self::decode(&bytes)
    }

    pub fn transaction(&self) -> &TempoTransaction {
        &self.tx
    }

    pub fn signature(&self) -> Option<&Bytes> {
        self.signature.as_ref()
    }

    pub fn has_sender_signature(&self) -> bool {
        self.signature.as_ref().is_some_and(|sig| !sig.is_empty())
    }

    pub fn sender_signing_hash(&self) -> B256 {
        self.tx.sender_signing_hash()
    }

    /// Whether the sender signature uses the 65-byte secp256k1 encoding.
    pub fn has_secp256k1_signature(&self) -> bool {
        self.signature.as_ref().is_some_and(|sig| sig.len() == 65)
    }

    /// Recover the sender from a 65-byte secp256k1 signature. Other signature
    /// kinds (and invalid signatures) yield `None`.
    pub fn recover_sender(&self) -> Option<Address> {
        let raw = self.signature.as_ref()?;
        if raw.len() != 65 {
            return None;
        }
        let sig = Signature::from_raw(raw).ok()?;
        sig.recover_address_from_prehash(&self.sender_signing_hash()).ok()
    }

    /// Serialized `0x76 || rlp(...)` bytes.
    pub fn encoded(&self) -> Bytes {
        encode_envelope(&self.tx, self.signature.as_ref())
    }

    /// `0x`-prefixed hex of [`encoded`](Self::encoded).
    pub fn encoded_hex(&self) -> String {
        alloy::hex::encode_prefixed(self.encoded())
    }

    /// Produce the fee-sponsored copy: attach `fee_token`, sign the fee payer
    /// payload for `sender` with `signer`, keep the sender signature as is.
    pub fn sponsor<S>(
        &self,
        fee_token: Address,
        sender: Address,
        signer: &S,
    ) -> Result<SponsoredTempoTransaction, X402Error>
    where
        S: SignerSync + ?Sized,
    {
        let mut tx = self.tx.clone();
        tx.fee_token = Some(fee_token);
        let hash = tx.fee_payer_signing_hash(sender);
        let fee_payer_signature = signer
            .sign_hash_sync(&hash)
            .map_err(|e| X402Error::SignatureError(format!("fee payer signing failed: {e}")))?;
        tx.fee_payer = FeePayerSlot::Signed(fee_payer_signature);

        Ok(SponsoredTempoTransaction {
            tx,
            sender_signature: self.signature.clone(),
            fee_payer_signature,
            sender,
        })
    }
}

/// An envelope carrying both the sender's and the fee payer's signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsoredTempoTransaction {
    tx: TempoTransaction,
    sender_signature: Option<Bytes>,
    fee_payer_signature: Signature,
    sender: Address,
}

impl SponsoredTempoTransaction {
    pub fn transaction(&self) -> &TempoTransaction {
        &self.tx
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn fee_payer_signature(&self) -> &Signature {
        &self.fee_payer_signature
    }

    /// Recover the fee payer address from its signature.
    pub fn recover_fee_payer(&self) -> Option<Address> {
        self.fee_payer_signature
            .recover_address_from_prehash(&self.tx.fee_payer_signing_hash(self.sender))
            .ok()
    }

    /// Bytes to submit with `eth_sendRawTransaction`.
    pub fn encoded(&self) -> Bytes {
        encode_envelope(&self.tx, self.sender_signature.as_ref())
    }

    pub fn encoded_hex(&self) -> String {
        alloy::hex::encode_prefixed(self.encoded())
    }
}

/// Fields the facilitator reads off a decoded single-transfer envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransaction {
    /// Recovered from the sender signature when possible.
    pub from: Option<Address>,
    pub to: Address,
    pub token: Address,
    pub value: U256,
    pub valid_before: Option<u64>,
    pub valid_after: Option<u64>,
    pub chain_id: Option<u64>,
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub has_sender_signature: bool,
}

impl ParsedTransaction {
    /// Validate that `signed` is a single zero-value token transfer and
    /// extract its fields.
    pub fn from_signed(signed: &SignedTempoTransaction) -> Result<Self, TransactionParseError> {
        let tx = signed.transaction();
        let call = match tx.calls.as_slice() {
            [] => return Err(TransactionParseError::NoCalls),
            [call] => call,
            calls => return Err(TransactionParseError::MultipleCalls(calls.len())),
        };

        if !call.input.starts_with(&TRANSFER_SELECTOR) {
            return Err(TransactionParseError::NotTransfer);
        }
        if call.input.len() != TRANSFER_CALLDATA_LEN {
            return Err(TransactionParseError::InvalidCallDataLength(call.input.len()));
        }
        if !call.value.is_zero() {
            return Err(TransactionParseError::NonZeroCallValue);
        }
        let token = call.to.ok_or(TransactionParseError::MissingCallTarget)?;

        let recipient_word = &call.input[4..36];
        if recipient_word[..12].iter().any(|b| *b != 0) {
            return Err(TransactionParseError::NonCanonicalRecipient);
        }

        Ok(Self {
            from: signed.recover_sender(),
            to: Address::from_slice(&recipient_word[12..]),
            token,
            value: U256::from_be_slice(&call.input[36..TRANSFER_CALLDATA_LEN]),
            valid_before: tx.valid_before,
            valid_after: tx.valid_after,
            chain_id: (tx.chain_id != 0).then_some(tx.chain_id),
            gas_limit: tx.gas_limit,
            max_fee_per_gas: tx.max_fee_per_gas,
            max_priority_fee_per_gas: tx.max_priority_fee_per_gas,
            has_sender_signature: signed.has_sender_signature(),
        })
    }
}

/// Decode a hex-serialized Tempo transaction and check it is a single
/// `transfer(address,uint256)` call with no native value attached.
pub fn parse_tempo_transaction(serialized: &str) -> Result<ParsedTransaction, TransactionParseError> {
    let signed = SignedTempoTransaction::decode_hex(serialized)?;
    ParsedTransaction::from_signed(&signed)
}

/// `transfer(to, value)` calldata: selector, left-padded address, big-endian value.
pub fn encode_transfer_call(to: Address, value: U256) -> Bytes {
    TIP20::transferCall { to, amount: value }.abi_encode().into()
}

fn encode_envelope(tx: &TempoTransaction, signature: Option<&Bytes>) -> Bytes {
    let mut payload = Vec::new();
    tx.encode_fields(tx.fee_token, FeePayerField::Slot(&tx.fee_payer), &mut payload);
    match signature {
        Some(sig) => sig.encode(&mut payload),
        None => payload.put_u8(EMPTY_STRING_CODE),
    }

    let mut out = Vec::with_capacity(payload.len() + 6);
    out.put_u8(TEMPO_TX_TYPE_BYTE);
    write_list(&payload, &mut out);
    out.into()
}

fn prefixed_list_hash(prefix: u8, payload: &[u8]) -> B256 {
    let mut out = Vec::with_capacity(payload.len() + 6);
    out.put_u8(prefix);
    write_list(payload, &mut out);
    keccak256(&out)
}

fn write_list(payload: &[u8], out: &mut dyn BufMut) {
    Header {
        list: true,
        payload_length: payload.len(),
    }
    .encode(out);
    out.put_slice(payload);
}

fn encode_optional<T: Encodable>(value: Option<T>, out: &mut dyn BufMut) {
    match value {
        Some(v) => v.encode(out),
        None => out.put_u8(EMPTY_STRING_CODE),
    }
}

/// Zero and the empty string both mean "unset".
fn decode_optional_scalar<T>(buf: &mut &[u8]) -> alloy::rlp::Result<Option<T>>
where
    T: Decodable + Default + PartialEq,
{
    let value = T::decode(buf)?;
    Ok((value != T::default()).then_some(value))
}

fn decode_optional_address(buf: &mut &[u8]) -> alloy::rlp::Result<Option<Address>> {
    if buf.first() == Some(&EMPTY_STRING_CODE) {
        skip_byte(buf);
        return Ok(None);
    }
    Address::decode(buf).map(Some)
}

fn skip_byte<'a>(buf: &mut &'a [u8]) {
    let rest: &'a [u8] = *buf;
    *buf = rest.get(1..).unwrap_or_default();
}

/// Consume a list header and return its payload.
fn list_body<'a>(buf: &mut &'a [u8]) -> alloy::rlp::Result<&'a [u8]> {
    let header = Header::decode(buf)?;
    if !header.list {
        return Err(alloy::rlp::Error::UnexpectedString);
    }
    let rest: &'a [u8] = *buf;
    if rest.len() < header.payload_length {
        return Err(alloy::rlp::Error::InputTooShort);
    }
    let (body, tail) = rest.split_at(header.payload_length);
    *buf = tail;
    Ok(body)
}

/// Consume one list item and return its full encoding.
fn take_raw_list<'a>(buf: &mut &'a [u8]) -> alloy::rlp::Result<Bytes> {
    let start: &'a [u8] = *buf;
    let header = Header::decode(buf)?;
    if !header.list {
        return Err(alloy::rlp::Error::UnexpectedString);
    }
    let total = start.len() - buf.len() + header.payload_length;
    if start.len() < total {
        return Err(alloy::rlp::Error::InputTooShort);
    }
    *buf = &start[total..];
    Ok(Bytes::copy_from_slice(&start[..total]))
}
