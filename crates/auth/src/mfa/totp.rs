use crate::error::{AuthError, Result};
use base32::Alphabet;
use image::Luma;
use qrcode::QrCode;
use rand::Rng;
use totp_lite::{totp_custom, Sha1};

const TOTP_DIGITS: u32 = 6;
const TOTP_STEP: u64 = 30; // 30 seconds

/// Generate a random secret for TOTP
pub fn generate_secret() -> String {
    let mut rng = rand::thread_rng();
    let secret_bytes: Vec<u8> = (0..20).map(|_| rng.gen()).collect();
    base32::encode(Alphabet::Rfc4648 { padding: false }, &secret_bytes)
}

fn code_at(secret_bytes: &[u8], time: u64) -> String {
    totp_custom::<Sha1>(TOTP_STEP, TOTP_DIGITS, secret_bytes, time)
}

/// Verify a TOTP code against a secret at the current time.
/// Allows a window of ±1 step (30 seconds) to account for clock drift.
pub fn verify_totp(secret: &str, code: &str) -> Result<bool> {
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| AuthError::Internal(format!("Time error: {}", e)))?
        .as_secs();

    verify_totp_at(secret, code, time)
}

/// Verify a TOTP code at an explicit unix time. Checks the current step and
/// ±1 step.
pub fn verify_totp_at(secret: &str, code: &str, time: u64) -> Result<bool> {
    let secret_bytes = base32::decode(Alphabet::Rfc4648 { padding: false }, secret)
        .ok_or_else(|| AuthError::ValidationError("Invalid secret format".to_string()))?;

    for time_offset in [-1i64, 0, 1] {
        let check_time = (time as i64 + (time_offset * TOTP_STEP as i64)) as u64;
        let expected_code = code_at(&secret_bytes, check_time);

        if constant_time_compare(&expected_code, code) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Generate a TOTP URI for QR code generation (otpauth:// format)
pub fn generate_totp_uri(secret: &str, account_name: &str, issuer: &str) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
        urlencoding::encode(issuer),
        urlencoding::encode(account_name),
        secret,
        urlencoding::encode(issuer),
        TOTP_DIGITS,
        TOTP_STEP
    )
}

/// Generate a QR code image from a TOTP URI. Returns PNG image bytes.
pub fn generate_qr_code(totp_uri: &str) -> Result<Vec<u8>> {
    let qr = QrCode::new(totp_uri.as_bytes())
        .map_err(|e| AuthError::Internal(format!("QR code generation failed: {}", e)))?;

    let image = qr.render::<Luma<u8>>().min_dimensions(256, 256).build();

    let mut png_bytes = Vec::new();
    image::DynamicImage::ImageLuma8(image)
        .write_to(
            &mut std::io::Cursor::new(&mut png_bytes),
            image::ImageFormat::Png,
        )
        .map_err(|e| AuthError::Internal(format!("PNG encoding failed: {}", e)))?;

    Ok(png_bytes)
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    let mut result = 0u8;
    for i in 0..a_bytes.len() {
        result |= a_bytes[i] ^ b_bytes[i];
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_code(secret: &str, time: u64) -> String {
        let secret_bytes = base32::decode(Alphabet::Rfc4648 { padding: false }, secret).unwrap();
        code_at(&secret_bytes, time)
    }

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret();
        assert!(!secret.is_empty());
        assert!(secret.len() >= 32); // Base32 encoded 20 bytes
    }

    #[test]
    fn test_code_shape() {
        let secret = generate_secret();
        let code = current_code(&secret, 1_700_000_000);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_window_accepts_adjacent_steps() {
        let secret = generate_secret();
        let t = 1_700_000_000u64;
        let code = current_code(&secret, t);

        assert!(verify_totp_at(&secret, &code, t).unwrap());
        // One step of drift either way still validates
        assert!(verify_totp_at(&secret, &code, t - 30).unwrap());
        assert!(verify_totp_at(&secret, &code, t + 30).unwrap());
    }

    #[test]
    fn test_window_rejects_distant_steps() {
        let secret = generate_secret();
        let t = 1_700_000_000u64;
        let code = current_code(&secret, t);

        assert!(!verify_totp_at(&secret, &code, t + 90).unwrap());
        assert!(!verify_totp_at(&secret, &code, t - 90).unwrap());
    }

    #[test]
    fn test_wrong_code_rejected() {
        let secret = generate_secret();
        let t = 1_700_000_000u64;
        let code = current_code(&secret, t);
        let wrong = if code == "000000" { "000001" } else { "000000" };

        assert!(!verify_totp_at(&secret, wrong, t).unwrap());
    }

    #[test]
    fn test_invalid_secret_is_an_error() {
        assert!(verify_totp_at("not base32 !!!", "123456", 0).is_err());
    }

    #[test]
    fn test_totp_uri_generation() {
        let secret = "JBSWY3DPEHPK3PXP";
        let uri = generate_totp_uri(secret, "user@example.com", "Aegis");
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("secret=JBSWY3DPEHPK3PXP"));
        assert!(uri.contains("issuer=Aegis"));
        assert!(uri.contains("period=30"));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("123456", "123456"));
        assert!(!constant_time_compare("123456", "123457"));
        assert!(!constant_time_compare("123456", "12345"));
    }
}
