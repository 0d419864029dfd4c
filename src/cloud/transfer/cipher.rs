use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

use super::Transform;
use crate::libs::error::{AnyResult, CloudFsError};

/*
 * Stream format:
 *
 *   "CFS1" | salt (16 bytes) | frame*
 *   frame = ciphertext length (u32 BE) | AES-256-GCM ciphertext and tag
 *
 * Each frame seals at most FRAME_SIZE bytes of plaintext. The nonce is the
 * frame counter (u64 BE) followed by a flag byte set only on the last frame,
 * so dropping, reordering or appending frames fails authentication.
 */

const MAGIC: &[u8; 4] = b"CFS1";
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;
const LENGTH_LEN: usize = 4;
const HEADER_LEN: usize = 4 + SALT_LEN;
const PBKDF2_ROUNDS: u32 = 100_000;

pub const FRAME_SIZE: usize = 64 * 1024;

fn derive_key(password: &str, salt: &[u8]) -> AnyResult<LessSafeKey> {
    let rounds = NonZeroU32::new(PBKDF2_ROUNDS)
        .ok_or_else(|| CloudFsError::Crypto("invalid round count".to_string()))?;
    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        salt,
        password.as_bytes(),
        &mut key,
    );
    Ok(LessSafeKey::new(UnboundKey::new(&AES_256_GCM, &key)?))
}

fn frame_nonce(counter: u64, last: bool) -> Nonce {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..8].copy_from_slice(&counter.to_be_bytes());
    nonce[NONCE_LEN - 1] = last as u8;
    Nonce::assume_unique_for_key(nonce)
}

/// Password based encryption stage
pub struct Encrypt {
    key: LessSafeKey,
    header: Option<Vec<u8>>,
    buffer: Vec<u8>,
    counter: u64,
}

impl Encrypt {
    pub fn new(password: &str) -> AnyResult<Self> {
        let mut salt = [0u8; SALT_LEN];
        SystemRandom::new().fill(&mut salt)?;

        let mut header = MAGIC.to_vec();
        header.extend_from_slice(&salt);
        Ok(Self {
            key: derive_key(password, &salt)?,
            header: Some(header),
            buffer: Vec::new(),
            counter: 0,
        })
    }

    fn seal(&mut self, mut frame: Vec<u8>, last: bool) -> AnyResult<Vec<u8>> {
        self.key
            .seal_in_place_append_tag(frame_nonce(self.counter, last), Aad::empty(), &mut frame)?;
        self.counter += 1;

        let mut out = Vec::with_capacity(LENGTH_LEN + frame.len());
        out.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        out.extend(frame);
        Ok(out)
    }
}

impl Transform for Encrypt {
    fn update(&mut self, chunk: &[u8]) -> AnyResult<Vec<u8>> {
        let mut out = self.header.take().unwrap_or_default();
        self.buffer.extend_from_slice(chunk);
        // Keep at least one byte back so the last frame is sealed by finish
        while self.buffer.len() > FRAME_SIZE {
            let rest = self.buffer.split_off(FRAME_SIZE);
            let frame = std::mem::replace(&mut self.buffer, rest);
            out.extend(self.seal(frame, false)?);
        }
        Ok(out)
    }

    fn finish(&mut self) -> AnyResult<Vec<u8>> {
        let mut out = self.header.take().unwrap_or_default();
        let frame = std::mem::take(&mut self.buffer);
        out.extend(self.seal(frame, true)?);
        Ok(out)
    }
}

/// Reverse of `Encrypt`
pub struct Decrypt {
    password: String,
    key: Option<LessSafeKey>,
    buffer: Vec<u8>,
    counter: u64,
}

impl Decrypt {
    pub fn new(password: &str) -> Self {
        Self {
            password: password.to_string(),
            key: None,
            buffer: Vec::new(),
            counter: 0,
        }
    }

    fn read_header(&mut self) -> AnyResult<bool> {
        if self.key.is_some() {
            return Ok(true);
        }
        if self.buffer.len() < HEADER_LEN {
            return Ok(false);
        }
        if &self.buffer[..MAGIC.len()] != MAGIC {
            return Err(CloudFsError::Crypto("not an encrypted stream".to_string()));
        }
        let header: Vec<u8> = self.buffer.drain(..HEADER_LEN).collect();
        self.key = Some(derive_key(&self.password, &header[MAGIC.len()..])?);
        Ok(true)
    }

    /// Length of the complete frame at the head of the buffer, if any
    fn next_frame_len(&self) -> AnyResult<Option<usize>> {
        let Some(length) = self.buffer.get(..LENGTH_LEN) else {
            return Ok(None);
        };
        let length = u32::from_be_bytes([length[0], length[1], length[2], length[3]]) as usize;
        if !(TAG_LEN..=FRAME_SIZE + TAG_LEN).contains(&length) {
            return Err(CloudFsError::Crypto(format!(
                "frame {} has an invalid length",
                self.counter
            )));
        }
        let total = LENGTH_LEN + length;
        Ok((self.buffer.len() >= total).then_some(total))
    }

    fn open(&mut self, total: usize, last: bool) -> AnyResult<Vec<u8>> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| CloudFsError::Crypto("missing key".to_string()))?;
        let mut frame: Vec<u8> = self.buffer.drain(..total).skip(LENGTH_LEN).collect();
        let plain = key
            .open_in_place(frame_nonce(self.counter, last), Aad::empty(), &mut frame)
            .map_err(|_| {
                CloudFsError::Crypto(format!(
                    "frame {} failed authentication (wrong password or altered content)",
                    self.counter
                ))
            })?;
        let plain = plain.to_vec();
        self.counter += 1;
        Ok(plain)
    }
}

impl Transform for Decrypt {
    fn update(&mut self, chunk: &[u8]) -> AnyResult<Vec<u8>> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        if !self.read_header()? {
            return Ok(out);
        }
        // A frame is known not to be the last one only once more bytes follow it
        while let Some(total) = self.next_frame_len()? {
            if self.buffer.len() == total {
                break;
            }
            out.extend(self.open(total, false)?);
        }
        Ok(out)
    }

    fn finish(&mut self) -> AnyResult<Vec<u8>> {
        if !self.read_header()? {
            return Err(CloudFsError::Crypto("truncated header".to_string()));
        }
        match self.next_frame_len()? {
            Some(total) if total == self.buffer.len() => self.open(total, true),
            _ => Err(CloudFsError::Crypto("truncated stream".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    fn run(transform: &mut dyn Transform, input: &[u8], chunk_size: usize) -> AnyResult<Vec<u8>> {
        let mut out = Vec::new();
        for chunk in input.chunks(chunk_size) {
            out.extend(transform.update(chunk)?);
        }
        out.extend(transform.finish()?);
        Ok(out)
    }

    fn encrypt(input: &[u8]) -> Vec<u8> {
        run(&mut Encrypt::new("secret").unwrap(), input, 10_000).unwrap()
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(FRAME_SIZE)]
    #[case(FRAME_SIZE + 1)]
    #[case(3 * FRAME_SIZE + 17)]
    fn restores_plaintext(#[case] size: usize) {
        let input: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let sealed = encrypt(&input);
        assert_eq!(&sealed[..4], MAGIC);

        let restored = run(&mut Decrypt::new("secret"), &sealed, 4093).unwrap();
        assert_eq!(restored, input);
    }

    #[rstest]
    fn salts_differ_between_runs() {
        assert_ne!(encrypt(b"same"), encrypt(b"same"));
    }

    #[rstest]
    fn wrong_password_fails() {
        let sealed = encrypt(b"top secret");
        let err = run(&mut Decrypt::new("guess"), &sealed, 64).unwrap_err();
        assert!(matches!(err, CloudFsError::Crypto(_)));
    }

    #[rstest]
    fn tampered_byte_fails() {
        let mut sealed = encrypt(b"top secret");
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(run(&mut Decrypt::new("secret"), &sealed, 64).is_err());
    }

    #[rstest]
    fn dropped_last_frame_fails() {
        let input = vec![7u8; 2 * FRAME_SIZE + 10];
        let sealed = encrypt(&input);
        let last_frame = LENGTH_LEN + 10 + TAG_LEN;
        let truncated = &sealed[..sealed.len() - last_frame];
        assert!(run(&mut Decrypt::new("secret"), truncated, 8192).is_err());
    }

    #[rstest]
    fn cut_inside_frame_fails() {
        let sealed = encrypt(b"a short message");
        let truncated = &sealed[..sealed.len() - 3];
        let err = run(&mut Decrypt::new("secret"), truncated, 64).unwrap_err();
        assert!(matches!(err, CloudFsError::Crypto(_)));
    }

    #[rstest]
    fn rejects_plain_input() {
        let err = run(&mut Decrypt::new("secret"), &[0u8; 64], 64).unwrap_err();
        assert!(matches!(err, CloudFsError::Crypto(_)));
    }
}
