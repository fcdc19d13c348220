/// Maps the two-letter prefix of an instrument identifier to a country name.
pub trait CountryLookup {
    fn country(&self, code: &str) -> Option<&str>;
}

/// Static ISIN prefix table covering the issuers commonly seen on retail brokers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsinCountries;

const ISIN_COUNTRIES: &[(&str, &str)] = &[
    ("AT", "Austria"),
    ("AU", "Australia"),
    ("BE", "Belgium"),
    ("BM", "Bermuda"),
    ("BR", "Brazil"),
    ("CA", "Canada"),
    ("CH", "Switzerland"),
    ("CN", "China"),
    ("CY", "Cyprus"),
    ("CZ", "Czech Republic"),
    ("DE", "Germany"),
    ("DK", "Denmark"),
    ("ES", "Spain"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("GG", "Guernsey"),
    ("GR", "Greece"),
    ("HK", "Hong Kong"),
    ("IE", "Ireland"),
    ("IL", "Israel"),
    ("IN", "India"),
    ("IT", "Italy"),
    ("JE", "Jersey"),
    ("JP", "Japan"),
    ("KR", "South Korea"),
    ("KY", "Cayman Islands"),
    ("LU", "Luxembourg"),
    ("MX", "Mexico"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("NZ", "New Zealand"),
    ("PL", "Poland"),
    ("PT", "Portugal"),
    ("SE", "Sweden"),
    ("SG", "Singapore"),
    ("TW", "Taiwan"),
    ("US", "United States"),
    ("VG", "British Virgin Islands"),
    ("ZA", "South Africa"),
];

impl CountryLookup for IsinCountries {
    fn country(&self, code: &str) -> Option<&str> {
        ISIN_COUNTRIES
            .binary_search_by(|(prefix, _)| prefix.cmp(&code))
            .ok()
            .map(|idx| ISIN_COUNTRIES[idx].1)
    }
}

/// Uppercased first two characters of an instrument identifier.
pub fn country_code(isin: &str) -> Option<String> {
    let code: String = isin.trim().chars().take(2).collect();
    if code.chars().count() < 2 {
        return None;
    }
    Some(code.to_uppercase())
}
