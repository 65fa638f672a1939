//! Human-readable owner/category for queried domains.

/// Who is behind a domain, as far as the static table knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompanyInfo {
    pub name: &'static str,
    pub category: &'static str,
    pub badge: &'static str,
}

const fn company(name: &'static str, category: &'static str, badge: &'static str) -> CompanyInfo {
    CompanyInfo {
        name,
        category,
        badge,
    }
}

/// Substring patterns, checked in order.
const KNOWN: &[(&[&str], CompanyInfo)] = &[
    (
        &["google", "gstatic", "1e100"],
        company("Google LLC", "Services & Search", "G"),
    ),
    (
        &["facebook", "fbcdn", "instagram"],
        company("Meta Platforms", "Social Network", "F"),
    ),
    (
        &["vk.com", "userapi", "vkuser"],
        company("VK Corp", "Social Network", "V"),
    ),
    (&["yandex", "ya.ru"], company("Yandex", "Search & Services", "Y")),
    (&["whatsapp"], company("WhatsApp", "Messenger", "W")),
    (&["telegram", "t.me"], company("Telegram", "Messenger", "T")),
    (
        &["tiktok", "bytedance"],
        company("TikTok", "Social Video", "TT"),
    ),
    (&["apple", "icloud"], company("Apple Inc.", "Cloud Services", "A")),
    (
        &["microsoft", "live.com"],
        company("Microsoft", "OS & Services", "M"),
    ),
    (&["amazon", "aws"], company("Amazon AWS", "Cloud Hosting", "AWS")),
];

const AD_NETWORK: CompanyInfo = company("Ad Network", "Tracker / Ads", "AD");
const UNKNOWN: CompanyInfo = company("Unknown Host", "Web / Content", "?");

/// Identify the company behind `domain`.
///
/// Known names win over the tracker flag; unknown trackers are reported
/// as an ad network.
pub fn identify_company(domain: &str, is_tracker: bool) -> CompanyInfo {
    let domain = domain.to_ascii_lowercase();

    KNOWN
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| domain.contains(p)))
        .map(|(_, info)| *info)
        .unwrap_or(if is_tracker { AD_NETWORK } else { UNKNOWN })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_companies() {
        assert_eq!(identify_company("www.google.com", false).name, "Google LLC");
        assert_eq!(identify_company("scontent.fbcdn.net", true).name, "Meta Platforms");
        assert_eq!(identify_company("S3.AMAZONAWS.COM", false).badge, "AWS");
    }

    #[test]
    fn unknown_trackers_are_ad_networks() {
        assert_eq!(identify_company("ads.example.com", true), AD_NETWORK);
        assert_eq!(identify_company("ads.example.com", false), UNKNOWN);
    }
}
