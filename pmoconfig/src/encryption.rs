//! Chiffrement des secrets stockés dans la configuration
//!
//! Les client secrets et refresh tokens OAuth sont écrits dans `config.yaml`
//! sous la forme `encrypted:BASE64`. La clé AES-256 est dérivée de
//! `PMOFEED_SECRET_KEY` si la variable est définie, sinon de l'UUID matériel
//! de la machine (le fichier config n'est alors pas portable).

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Result};
use base64::Engine;
use sha2::{Digest, Sha256};

/// Préfixe pour identifier les secrets chiffrés
const ENCRYPTED_PREFIX: &str = "encrypted:";

/// Variable d'environnement fournissant explicitement la clé
const ENV_SECRET_KEY: &str = "PMOFEED_SECRET_KEY";

const KEY_SALT: &[u8] = b"pmofeed-config-encryption-v1";
const NONCE_SALT: &[u8] = b"pmofeed-nonce-v1";

/// Récupère l'UUID matériel de la machine
///
/// Sur macOS, utilise `ioreg -d2 -c IOPlatformExpertDevice`
/// Sur Linux, utilise `/etc/machine-id` ou `/var/lib/dbus/machine-id`
/// Sur Windows, utilise `wmic csproduct get UUID`
fn get_machine_uuid() -> Result<String> {
    #[cfg(target_os = "macos")]
    {
        let output = std::process::Command::new("ioreg")
            .args(["-d2", "-c", "IOPlatformExpertDevice"])
            .output()?;

        let output_str = String::from_utf8_lossy(&output.stdout);

        for line in output_str.lines() {
            if line.contains("IOPlatformUUID") {
                // Format: "IOPlatformUUID" = "XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX"
                if let Some(uuid) = line.split('"').nth(3) {
                    return Ok(uuid.to_string());
                }
            }
        }

        Err(anyhow!("Failed to extract IOPlatformUUID from ioreg"))
    }

    #[cfg(target_os = "linux")]
    {
        use std::fs;

        if let Ok(uuid) = fs::read_to_string("/etc/machine-id") {
            return Ok(uuid.trim().to_string());
        }

        if let Ok(uuid) = fs::read_to_string("/var/lib/dbus/machine-id") {
            return Ok(uuid.trim().to_string());
        }

        Err(anyhow!("Failed to read machine-id"))
    }

    #[cfg(target_os = "windows")]
    {
        let output = std::process::Command::new("wmic")
            .args(["csproduct", "get", "UUID"])
            .output()?;

        let output_str = String::from_utf8_lossy(&output.stdout);

        if let Some(uuid) = output_str.lines().nth(1) {
            return Ok(uuid.trim().to_string());
        }

        Err(anyhow!("Failed to extract UUID from wmic"))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        Err(anyhow!("Unsupported platform for machine UUID extraction"))
    }
}

/// Matériau de clé : variable d'environnement, sinon UUID machine
fn key_material() -> Result<String> {
    match std::env::var(ENV_SECRET_KEY) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => get_machine_uuid(),
    }
}

/// Dérive une clé AES-256 à partir d'un matériau arbitraire
fn derive_key(material: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    hasher.update(KEY_SALT);

    let mut key = [0u8; 32];
    key.copy_from_slice(&hasher.finalize());
    key
}

/// Chiffre un secret avec une clé dérivée de `material`
///
/// Le format encodé est : `encrypted:` + base64(nonce(12 bytes) + ciphertext).
/// Le nonce est dérivé du secret : même secret, même texte chiffré, ce qui
/// évite de réécrire le fichier config quand rien n'a changé.
pub fn encrypt_with(material: &str, secret: &str) -> Result<String> {
    let key = derive_key(material);
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let mut nonce_bytes = [0u8; 12];
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(NONCE_SALT);
    nonce_bytes.copy_from_slice(&hasher.finalize()[..12]);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, secret.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;

    let mut combined = Vec::with_capacity(12 + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.extend_from_slice(&ciphertext);

    Ok(format!(
        "{}{}",
        ENCRYPTED_PREFIX,
        base64::engine::general_purpose::STANDARD.encode(&combined)
    ))
}

/// Déchiffre un secret produit par [`encrypt_with`] avec le même matériau
pub fn decrypt_with(material: &str, encrypted: &str) -> Result<String> {
    let base64_data = encrypted
        .strip_prefix(ENCRYPTED_PREFIX)
        .ok_or_else(|| anyhow!("Invalid encrypted secret format (missing prefix)"))?;

    let key = derive_key(material);
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| anyhow!("Failed to create cipher: {}", e))?;

    let combined = base64::engine::general_purpose::STANDARD
        .decode(base64_data)
        .map_err(|e| anyhow!("Invalid base64: {}", e))?;

    if combined.len() < 12 {
        return Err(anyhow!("Invalid ciphertext (too short)"));
    }

    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|e| anyhow!("Decryption failed (wrong key or corrupted data): {}", e))?;

    String::from_utf8(plaintext).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
}

/// Chiffre un secret avec la clé de la machine
pub fn encrypt_secret(secret: &str) -> Result<String> {
    encrypt_with(&key_material()?, secret)
}

/// Déchiffre un secret avec la clé de la machine
pub fn decrypt_secret(encrypted: &str) -> Result<String> {
    decrypt_with(&key_material()?, encrypted)
}

/// Vérifie si une valeur est un secret chiffré
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Obtient le secret en clair, qu'il soit chiffré ou non
///
/// Les valeurs saisies à la main dans `config.yaml` restent en clair
/// jusqu'à la prochaine écriture par l'application.
pub fn reveal_secret(value: &str) -> Result<String> {
    if is_encrypted(value) {
        decrypt_secret(value)
    } else {
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATERIAL: &str = "0123456789abcdef";

    #[test]
    fn test_encrypt_decrypt() {
        let secret = "refresh-token-XYZ";

        let encrypted = encrypt_with(MATERIAL, secret).unwrap();
        assert!(encrypted.starts_with(ENCRYPTED_PREFIX));
        assert_ne!(encrypted, secret);

        let decrypted = decrypt_with(MATERIAL, &encrypted).unwrap();
        assert_eq!(decrypted, secret);
    }

    #[test]
    fn test_encryption_is_deterministic() {
        let a = encrypt_with(MATERIAL, "same").unwrap();
        let b = encrypt_with(MATERIAL, "same").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = encrypt_with(MATERIAL, "secret").unwrap();
        assert!(decrypt_with("another-key", &encrypted).is_err());
    }

    #[test]
    fn test_is_encrypted() {
        assert!(is_encrypted("encrypted:SGVsbG8="));
        assert!(!is_encrypted("plaintext"));
        assert!(!is_encrypted(""));
    }

    #[test]
    fn test_reveal_plaintext() {
        assert_eq!(reveal_secret("plaintext").unwrap(), "plaintext");
    }
}
