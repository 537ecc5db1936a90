use crate::error::{AuthError, Result};
use aegis_database::KeyRepository;
use aegis_models::{Jwk, Jwks, SigningKey};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header};
use rsa::pkcs8::{DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::RwLock;
use tracing::info;

const RSA_BITS: usize = 2048;

/// Key id derived deterministically from public key material.
pub fn derive_kid(public_material: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_material);
    hex::encode(hasher.finalize())[..16].to_string()
}

struct LoadedKey {
    meta: SigningKey,
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
}

/// Holds the signing material and exposes the public key set. The active key
/// signs; retired keys stay in the decoding set until their expiry so tokens
/// issued under them verify to natural expiry.
pub struct KeyManager {
    keys: RwLock<Vec<LoadedKey>>,
}

impl KeyManager {
    pub fn from_keys(keys: Vec<SigningKey>) -> Result<Self> {
        let loaded = keys
            .into_iter()
            .map(load_key)
            .collect::<Result<Vec<_>>>()?;

        if !loaded.iter().any(|k| k.meta.is_active) {
            return Err(AuthError::Internal("no active signing key".to_string()));
        }

        Ok(Self {
            keys: RwLock::new(loaded),
        })
    }

    /// Load keys from the store, generating and persisting an initial RSA
    /// key on first boot.
    pub async fn bootstrap(repo: &KeyRepository) -> Result<Self> {
        let mut keys = repo.list_usable().await?;

        if keys.is_empty() {
            let key = generate_rsa_key(true)?;
            info!(kid = %key.kid, "Generated initial signing key");
            repo.insert(&key).await?;
            keys.push(key);
        }

        Self::from_keys(keys)
    }

    /// Generate a new active key and retire the current signer. Retired keys
    /// keep verifying until their expiry.
    pub async fn rotate(&self, repo: &KeyRepository) -> Result<String> {
        let key = generate_rsa_key(true)?;
        repo.insert(&key).await?;
        repo.set_active(&key.kid).await?;

        let kid = key.kid.clone();
        let keys = repo.list_usable().await?;
        let loaded = keys
            .into_iter()
            .map(load_key)
            .collect::<Result<Vec<_>>>()?;

        *self.write()? = loaded;
        info!(kid = %kid, "Rotated signing key");

        Ok(kid)
    }

    /// Sign claims with the active key; the key id travels in the header.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        let keys = self.read()?;
        let active = keys
            .iter()
            .find(|k| k.meta.is_active)
            .ok_or_else(|| AuthError::Internal("no active signing key".to_string()))?;

        let mut header = Header::new(active.algorithm);
        header.kid = Some(active.meta.kid.clone());

        let token = jsonwebtoken::encode(&header, claims, &active.encoding)?;
        Ok(token)
    }

    /// Verify signature and expiry against the key named in the token
    /// header.
    pub fn verify<T: DeserializeOwned>(&self, token: &str) -> Result<T> {
        let header = jsonwebtoken::decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::Unauthorized("token has no key id".to_string()))?;

        let keys = self.read()?;
        let key = keys
            .iter()
            .find(|k| k.meta.kid == kid)
            .ok_or_else(|| AuthError::Unauthorized(format!("unknown key id {}", kid)))?;

        let mut validation = jsonwebtoken::Validation::new(key.algorithm);
        validation.validate_aud = false;

        let data = jsonwebtoken::decode::<T>(token, &key.decoding, &validation)?;
        Ok(data.claims)
    }

    /// Public key set. Only asymmetric public material appears here;
    /// symmetric (HS256) keys are a verification-only compatibility path and
    /// are never published.
    pub fn jwks(&self) -> Result<Jwks> {
        let keys = self.read()?;
        let jwks = keys
            .iter()
            .filter(|k| k.algorithm == Algorithm::RS256)
            .filter_map(|k| public_jwk(&k.meta).ok())
            .collect();

        Ok(Jwks { keys: jwks })
    }

    pub fn active_kid(&self) -> Result<String> {
        let keys = self.read()?;
        keys.iter()
            .find(|k| k.meta.is_active)
            .map(|k| k.meta.kid.clone())
            .ok_or_else(|| AuthError::Internal("no active signing key".to_string()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<LoadedKey>>> {
        self.keys
            .read()
            .map_err(|_| AuthError::Internal("key store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<LoadedKey>>> {
        self.keys
            .write()
            .map_err(|_| AuthError::Internal("key store lock poisoned".to_string()))
    }
}

fn load_key(meta: SigningKey) -> Result<LoadedKey> {
    match meta.algorithm.as_str() {
        "RS256" => {
            let encoding = EncodingKey::from_rsa_pem(meta.private_key_pem.as_bytes())
                .map_err(|e| AuthError::Internal(format!("Invalid signing key: {}", e)))?;
            let decoding = DecodingKey::from_rsa_pem(meta.public_key_pem.as_bytes())
                .map_err(|e| AuthError::Internal(format!("Invalid public key: {}", e)))?;

            Ok(LoadedKey {
                meta,
                encoding,
                decoding,
                algorithm: Algorithm::RS256,
            })
        }
        "HS256" => {
            let secret = meta.private_key_pem.as_bytes();
            Ok(LoadedKey {
                encoding: EncodingKey::from_secret(secret),
                decoding: DecodingKey::from_secret(secret),
                algorithm: Algorithm::HS256,
                meta,
            })
        }
        other => Err(AuthError::Internal(format!(
            "Unsupported key algorithm: {}",
            other
        ))),
    }
}

/// Generate a fresh RSA signing key with a kid derived from its public PEM.
pub fn generate_rsa_key(is_active: bool) -> Result<SigningKey> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, RSA_BITS)
        .map_err(|e| AuthError::Internal(format!("RSA key generation failed: {}", e)))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AuthError::Internal(format!("Key encoding failed: {}", e)))?
        .to_string();
    let public_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AuthError::Internal(format!("Key encoding failed: {}", e)))?;

    Ok(SigningKey {
        kid: derive_kid(public_pem.as_bytes()),
        algorithm: "RS256".to_string(),
        public_key_pem: public_pem,
        private_key_pem: private_pem,
        is_active,
        created_at: Utc::now(),
        expires_at: None,
    })
}

fn public_jwk(key: &SigningKey) -> Result<Jwk> {
    let public_key = RsaPublicKey::from_public_key_pem(&key.public_key_pem)
        .map_err(|e| AuthError::Internal(format!("Failed to parse public key: {}", e)))?;

    let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
    let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());

    Ok(Jwk {
        kty: "RSA".to_string(),
        r#use: "sig".to_string(),
        kid: key.kid.clone(),
        alg: key.algorithm.clone(),
        n,
        e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    struct TestClaims {
        sub: String,
        exp: i64,
    }

    fn claims() -> TestClaims {
        TestClaims {
            sub: "user-1".to_string(),
            exp: Utc::now().timestamp() + 300,
        }
    }

    #[test]
    fn test_kid_is_deterministic() {
        let kid1 = derive_kid(b"same material");
        let kid2 = derive_kid(b"same material");
        assert_eq!(kid1, kid2);
        assert_eq!(kid1.len(), 16);
        assert_ne!(kid1, derive_kid(b"other material"));
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let key = generate_rsa_key(true).unwrap();
        let manager = KeyManager::from_keys(vec![key]).unwrap();

        let token = manager.sign(&claims()).unwrap();
        let decoded: TestClaims = manager.verify(&token).unwrap();
        assert_eq!(decoded.sub, "user-1");
    }

    #[test]
    fn test_retired_key_still_verifies() {
        let old_key = generate_rsa_key(true).unwrap();
        let manager = KeyManager::from_keys(vec![old_key.clone()]).unwrap();
        let token = manager.sign(&claims()).unwrap();

        // Rotate: old key retired but still in the decoding set
        let mut retired = old_key;
        retired.is_active = false;
        let new_key = generate_rsa_key(true).unwrap();
        let rotated = KeyManager::from_keys(vec![retired, new_key.clone()]).unwrap();

        assert_eq!(rotated.active_kid().unwrap(), new_key.kid);
        let decoded: TestClaims = rotated.verify(&token).unwrap();
        assert_eq!(decoded.sub, "user-1");
    }

    #[test]
    fn test_jwks_has_no_private_material() {
        let key = generate_rsa_key(true).unwrap();
        let manager = KeyManager::from_keys(vec![key.clone()]).unwrap();

        let jwks = manager.jwks().unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, key.kid);

        let json = serde_json::to_string(&jwks).unwrap();
        assert!(!json.contains("PRIVATE KEY"));
        assert!(!json.contains(&key.private_key_pem));
    }

    #[test]
    fn test_jwks_excludes_symmetric_keys() {
        let rsa = generate_rsa_key(false).unwrap();
        let symmetric = SigningKey {
            kid: derive_kid(b"legacy-secret"),
            algorithm: "HS256".to_string(),
            public_key_pem: String::new(),
            private_key_pem: "legacy-shared-secret-at-least-32-bytes".to_string(),
            is_active: true,
            created_at: Utc::now(),
            expires_at: None,
        };
        let manager = KeyManager::from_keys(vec![rsa.clone(), symmetric]).unwrap();

        let jwks = manager.jwks().unwrap();
        assert_eq!(jwks.keys.len(), 1);
        assert_eq!(jwks.keys[0].kid, rsa.kid);
    }

    #[test]
    fn test_verify_rejects_unknown_kid() {
        let key_a = generate_rsa_key(true).unwrap();
        let key_b = generate_rsa_key(true).unwrap();

        let signer = KeyManager::from_keys(vec![key_a]).unwrap();
        let verifier = KeyManager::from_keys(vec![key_b]).unwrap();

        let token = signer.sign(&claims()).unwrap();
        let result: Result<TestClaims> = verifier.verify(&token);
        assert!(result.is_err());
    }
}
