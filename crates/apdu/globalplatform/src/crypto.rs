//! Cryptographic operations for the SCP02 secure channel
//!
//! Session keys are computed by the key-derivation service, so this module only
//! covers what happens locally: command MACs, chaining value encryption,
//! command data encryption and shared-secret key unwrapping.

use cbc_mac::{CbcMac, Mac};
use cipher::{
    BlockDecrypt, BlockEncrypt, BlockEncryptMut, Iv, IvSizeUser, Key, KeyInit, KeyIvInit,
    KeySizeUser,
    block_padding::Iso7816,
    consts::{U8, U16},
    generic_array::GenericArray,
};
use des::{Des, TdesEde3};

use crate::{ChannelError, Result};

/// SCP02 MAC value
pub type Scp02Mac = [u8; 8];

/// Placeholder struct for defining SCP02 cryptographic parameters
#[derive(Debug)]
pub struct Scp02;

impl KeySizeUser for Scp02 {
    type KeySize = U16;
}

impl IvSizeUser for Scp02 {
    type IvSize = U8;
}

/// Retail MAC over `data` chained from `iv`
///
/// ISO 7816 padding, single DES CBC under the first key half for all blocks but
/// the last, then two-key 3DES for the final block.
pub fn mac_full_3des(key: &Key<Scp02>, iv: &Iv<Scp02>, data: &[u8]) -> Scp02Mac {
    let mut padded = data.to_vec();
    padded.push(0x80);
    padded.resize(padded.len().div_ceil(8) * 8, 0x00);
    let (head, last) = padded.split_at(padded.len() - 8);

    let mut chain: [u8; 8] = (*iv).into();
    let single = Des::new(GenericArray::from_slice(&key[..8]));
    for block in head.chunks_exact(8) {
        chain = xor_block(&chain, block);
        single.encrypt_block(GenericArray::from_mut_slice(&mut chain));
    }

    let mut mac = xor_block(&chain, last);
    TdesEde3::new(&resize_key(key)).encrypt_block(GenericArray::from_mut_slice(&mut mac));
    mac
}

fn xor_block(a: &[u8; 8], b: &[u8]) -> [u8; 8] {
    std::array::from_fn(|i| a[i] ^ b[i])
}

/// Encrypt an ICV (Initial Chaining Vector) for SCP02
///
/// Single DES under the first half of the MAC key.
pub fn encrypt_icv(mac_key: &Key<Scp02>, icv: &Iv<Scp02>) -> Iv<Scp02> {
    let key = GenericArray::from_slice(&mac_key[..8]);
    let mut mac = <CbcMac<Des> as Mac>::new(key);
    mac.update(icv.as_slice());
    mac.finalize().into_bytes()
}

/// Encrypt command data with 3DES-CBC, zero IV and ISO 7816 padding
pub fn encrypt_data(enc_key: &Key<Scp02>, data: &[u8]) -> Vec<u8> {
    cbc::Encryptor::<TdesEde3>::new(&resize_key(enc_key), &Default::default())
        .encrypt_padded_vec_mut::<Iso7816>(data)
}

/// Unwrap key material with two-key 3DES in ECB mode
pub fn ecb_decrypt(key: &Key<Scp02>, data: &[u8]) -> Result<Vec<u8>> {
    ecb(key, data, |cipher, block| cipher.decrypt_block(block))
}

/// Wrap key material with two-key 3DES in ECB mode, the inverse of [`ecb_decrypt`]
pub fn ecb_encrypt(key: &Key<Scp02>, data: &[u8]) -> Result<Vec<u8>> {
    ecb(key, data, |cipher, block| cipher.encrypt_block(block))
}

fn ecb(
    key: &Key<Scp02>,
    data: &[u8],
    op: impl Fn(&TdesEde3, &mut GenericArray<u8, U8>),
) -> Result<Vec<u8>> {
    if data.is_empty() || data.len() % 8 != 0 {
        return Err(ChannelError::Crypto("key material is not a whole number of blocks"));
    }
    let cipher = TdesEde3::new(&resize_key(key));
    let mut out = data.to_vec();
    out.chunks_exact_mut(8).for_each(|block| op(&cipher, GenericArray::from_mut_slice(block)));
    Ok(out)
}

/// Resize the SCP02 16-byte key to 24 bytes for 3DES
///
/// This copies the first 8 bytes to the end of the key.
pub fn resize_key(key: &Key<Scp02>) -> Key<TdesEde3> {
    let mut result = Key::<TdesEde3>::default();
    result[..16].copy_from_slice(key);
    result[16..24].copy_from_slice(&key[..8]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_resize_key_24() {
        let key = hex!("404142434445464748494a4b4c4d4e4f");
        let resized = resize_key(&Key::<Scp02>::clone_from_slice(&key));

        assert_eq!(
            resized.as_slice(),
            hex!("404142434445464748494a4b4c4d4e4f4041424344454647")
        );
    }

    #[test]
    fn test_mac_full_3des() {
        let key = hex!("5b02e75ad63190aece0622936f11abab");
        let key = Key::<Scp02>::clone_from_slice(&key);
        let data = hex!("8482010010810b098a8fbb88da");
        let result = mac_full_3des(&key, &Default::default(), &data);

        assert_eq!(result, hex!("5271d7174a5a166a"));
    }

    #[test]
    fn test_mac_depends_on_chaining_value() {
        let key = Key::<Scp02>::clone_from_slice(&hex!("404142434445464748494a4b4c4d4e4f"));
        let data = hex!("84F4000008");
        let zero = mac_full_3des(&key, &Default::default(), &data);
        let chained = mac_full_3des(&key, &encrypt_icv(&key, &Iv::<Scp02>::from(zero)), &data);
        assert_ne!(zero, chained);
    }

    #[test]
    fn test_ecb_wrap_unwrap() {
        let secret = Key::<Scp02>::clone_from_slice(&hex!("00112233445566778899aabbccddeeff"));
        let session_key = hex!("404142434445464748494a4b4c4d4e4f");

        let wrapped = ecb_encrypt(&secret, &session_key).unwrap();
        assert_ne!(wrapped.as_slice(), &session_key);
        assert_eq!(ecb_decrypt(&secret, &wrapped).unwrap(), session_key);
        assert!(ecb_decrypt(&secret, &wrapped[..15]).is_err());
    }

    #[test]
    fn test_encrypt_data_pads_to_block() {
        let key = Key::<Scp02>::clone_from_slice(&hex!("404142434445464748494a4b4c4d4e4f"));
        assert_eq!(encrypt_data(&key, &[0u8; 7]).len(), 8);
        assert_eq!(encrypt_data(&key, &[0u8; 8]).len(), 16);
    }
}
