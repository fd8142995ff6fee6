//! Support contact links.

/// Build a WhatsApp deep link for the support line. Everything but digits is
/// stripped from the phone number; the message is percent-encoded.
pub fn whatsapp_link(phone: &str, message: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("https://wa.me/{digits}?text={}", urlencoding::encode(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_encodes_message_and_strips_phone() {
        let link = whatsapp_link("+90 500 000 00 00", "Merhaba, bakiye yüklemek istiyorum");
        assert!(link.starts_with("https://wa.me/905000000000?text="));
        assert!(!link.contains(' '));
        assert!(link.contains("Merhaba%2C"));
    }
}
