// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! AES-CBC payload envelope.
//!
//! Payloads are padded with PKCS7, encrypted with AES-128/192/256 in CBC mode
//! (the variant follows the normalized key length) and base64 encoded.
//!
//! # Security
//!
//! The IV is the first 16 bytes of the normalized key, so identical
//! plaintexts produce identical ciphertexts. The collector expects this
//! layout, which is why it is kept; treat the envelope as obfuscation against
//! passive observers, not as authenticated encryption.

use std::fmt;

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes192CbcEnc = cbc::Encryptor<aes::Aes192>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes192CbcDec = cbc::Decryptor<aes::Aes192>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

#[derive(Debug, Error)]
pub enum CipherError {
	#[error("unsupported key length {0}")]
	InvalidKeyLength(usize),

	#[error("key is empty")]
	EmptyKey,

	#[error("invalid base64: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("ciphertext is empty")]
	Empty,

	#[error("ciphertext length {0} is not a multiple of the block size")]
	Misaligned(usize),

	#[error("invalid padding")]
	InvalidPadding,
}

pub type Result<T> = std::result::Result<T, CipherError>;

/// Normalizes an arbitrary key to a valid AES key length.
///
/// Keys of 32 bytes or more are truncated to 32, 24..32 to 24, 16..24 to 16.
/// Shorter keys are right-padded with zero bytes to 16.
pub fn normalize_key(key: &[u8]) -> Zeroizing<Vec<u8>> {
	let len = match key.len() {
		n if n >= 32 => 32,
		n if n >= 24 => 24,
		_ => 16,
	};
	let mut normalized = Zeroizing::new(vec![0u8; len]);
	let copied = key.len().min(len);
	normalized[..copied].copy_from_slice(&key[..copied]);
	normalized
}

/// Appends PKCS7 padding. Always adds between 1 and `block_size` bytes.
pub fn pkcs7_pad(data: &[u8], block_size: usize) -> Vec<u8> {
	let pad = block_size - data.len() % block_size;
	let mut padded = Vec::with_capacity(data.len() + pad);
	padded.extend_from_slice(data);
	padded.resize(data.len() + pad, pad as u8);
	padded
}

/// Strips PKCS7 padding, checking every pad byte.
pub fn pkcs7_unpad(data: &[u8]) -> Result<&[u8]> {
	let Some(&last) = data.last() else {
		return Err(CipherError::Empty);
	};
	let pad = last as usize;
	if pad == 0 || pad > BLOCK_SIZE || pad > data.len() {
		return Err(CipherError::InvalidPadding);
	}
	let (body, padding) = data.split_at(data.len() - pad);
	if padding.iter().any(|&b| b != last) {
		return Err(CipherError::InvalidPadding);
	}
	Ok(body)
}

/// Encrypts `plaintext` and returns standard base64.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<String> {
	let key = normalize_key(key);
	let padded = pkcs7_pad(plaintext, BLOCK_SIZE);
	let ciphertext = encrypt_blocks(&key, &padded)?;
	Ok(BASE64.encode(ciphertext))
}

/// Decodes base64 `encoded` and decrypts it. Fails closed: no partial
/// plaintext is returned on any error.
pub fn decrypt(key: &[u8], encoded: &str) -> Result<Vec<u8>> {
	let key = normalize_key(key);
	let ciphertext = BASE64.decode(encoded)?;
	if ciphertext.is_empty() {
		return Err(CipherError::Empty);
	}
	if ciphertext.len() % BLOCK_SIZE != 0 {
		return Err(CipherError::Misaligned(ciphertext.len()));
	}
	let plaintext = Zeroizing::new(decrypt_blocks(&key, &ciphertext)?);
	Ok(pkcs7_unpad(&plaintext)?.to_vec())
}

fn encrypt_blocks(key: &[u8], padded: &[u8]) -> Result<Vec<u8>> {
	let iv = &key[..BLOCK_SIZE];
	let invalid = |_| CipherError::InvalidKeyLength(key.len());
	let out = match key.len() {
		16 => Aes128CbcEnc::new_from_slices(key, iv)
			.map_err(invalid)?
			.encrypt_padded_vec_mut::<NoPadding>(padded),
		24 => Aes192CbcEnc::new_from_slices(key, iv)
			.map_err(invalid)?
			.encrypt_padded_vec_mut::<NoPadding>(padded),
		32 => Aes256CbcEnc::new_from_slices(key, iv)
			.map_err(invalid)?
			.encrypt_padded_vec_mut::<NoPadding>(padded),
		other => return Err(CipherError::InvalidKeyLength(other)),
	};
	Ok(out)
}

fn decrypt_blocks(key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
	let iv = &key[..BLOCK_SIZE];
	let invalid = |_| CipherError::InvalidKeyLength(key.len());
	let misaligned = |_| CipherError::Misaligned(ciphertext.len());
	match key.len() {
		16 => Aes128CbcDec::new_from_slices(key, iv)
			.map_err(invalid)?
			.decrypt_padded_vec_mut::<NoPadding>(ciphertext)
			.map_err(misaligned),
		24 => Aes192CbcDec::new_from_slices(key, iv)
			.map_err(invalid)?
			.decrypt_padded_vec_mut::<NoPadding>(ciphertext)
			.map_err(misaligned),
		32 => Aes256CbcDec::new_from_slices(key, iv)
			.map_err(invalid)?
			.decrypt_padded_vec_mut::<NoPadding>(ciphertext)
			.map_err(misaligned),
		other => Err(CipherError::InvalidKeyLength(other)),
	}
}

/// A normalized secret key, zeroized on drop.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<Vec<u8>>);

impl SecretKey {
	pub fn new(raw: impl AsRef<[u8]>) -> Self {
		Self(normalize_key(raw.as_ref()))
	}

	/// Returns the normalized key bytes. Keep the borrow short.
	pub fn expose(&self) -> &[u8] {
		&self.0
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Debug for SecretKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretKey(AES-{}, [REDACTED])", self.0.len() * 8)
	}
}

impl From<&str> for SecretKey {
	fn from(raw: &str) -> Self {
		Self::new(raw)
	}
}

impl From<String> for SecretKey {
	fn from(raw: String) -> Self {
		let raw = Zeroizing::new(raw);
		Self::new(raw.as_bytes())
	}
}

/// Encrypted request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
	pub data: String,
	pub timestamp: i64,
}

impl Envelope {
	pub fn seal(key: &SecretKey, plaintext: &[u8], timestamp: i64) -> Result<Self> {
		Ok(Self {
			data: encrypt(key.expose(), plaintext)?,
			timestamp,
		})
	}

	pub fn open(&self, key: &SecretKey) -> Result<Vec<u8>> {
		decrypt(key.expose(), &self.data)
	}
}

/// Response body shape used by the collector when it encrypts replies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EncryptedResponse {
	#[serde(default)]
	pub encrypted: bool,
	pub data: String,
	#[serde(default)]
	pub timestamp: i64,
}
