use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Version marker at the end of a DOI, e.g. `.v3`
    pub static ref VERSION_PATTERN: Regex = Regex::new(r"\.v(\d+)$").unwrap();

    /// Registrant code of a DOI given in resolver-URL form: `https://doi.org/10.1234/...`
    pub static ref PUBLISHER_PATTERN: Regex = Regex::new(r"org/10\.(\d+)").unwrap();
}

/// Number of `/`-separated segments kept when normalising a DOI path
const DOI_PATH_SEGMENTS: usize = 3;

/// Resolver-URL prefix segments (`https:`, ``, `doi.org`) skipped before the DOI path
const RESOLVER_PREFIX_SEGMENTS: usize = 3;

/// Fields derived from a record's DOI for the duration of one dedup run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoiFields {
    pub version: Option<u32>,
    pub unversioned: String,
    pub publisher: String,
}

impl DoiFields {
    /// Derive all DOI fields; an absent DOI yields empty fields
    pub fn derive(doi: Option<&str>) -> Self {
        match doi {
            Some(doi) => Self {
                version: doi_version(doi),
                unversioned: unversioned_doi(doi),
                publisher: publisher_doi(doi),
            },
            None => Self::default(),
        }
    }
}

/// Extract the version number from a DOI ending in `.vN`
pub fn doi_version(doi: &str) -> Option<u32> {
    VERSION_PATTERN
        .captures(doi)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Normalise a DOI to its three-segment path with any `.vN` suffix removed
///
/// "https://doi.org/10.5281/zenodo.123.v2" -> "10.5281/zenodo.123"
/// A bare DOI ("10.5281/zenodo.123") is treated as its own path.
pub fn unversioned_doi(doi: &str) -> String {
    let skip = if doi.starts_with("10.") {
        0
    } else {
        RESOLVER_PREFIX_SEGMENTS
    };
    let path = doi
        .split('/')
        .skip(skip)
        .take(DOI_PATH_SEGMENTS)
        .collect::<Vec<_>>()
        .join("/");
    VERSION_PATTERN.replace(&path, "").into_owned()
}

/// Extract the numeric publisher prefix from a resolver-URL DOI, empty when none
pub fn publisher_doi(doi: &str) -> String {
    PUBLISHER_PATTERN
        .captures(doi)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doi_version() {
        assert_eq!(doi_version("https://doi.org/10.5281/zenodo.1.v2"), Some(2));
        assert_eq!(doi_version("https://doi.org/10.5281/zenodo.1.v12"), Some(12));
        assert_eq!(doi_version("https://doi.org/10.5281/zenodo.1"), None);
        assert_eq!(doi_version("10.1/abc.v2x"), None);
    }

    #[test]
    fn test_unversioned_doi_from_url() {
        assert_eq!(unversioned_doi("https://doi.org/10.1/abc.v1"), "10.1/abc");
        assert_eq!(unversioned_doi("https://doi.org/10.1/abc"), "10.1/abc");
        assert_eq!(
            unversioned_doi("https://doi.org/10.1/series/item.v3/extra"),
            "10.1/series/item"
        );
    }

    #[test]
    fn test_unversioned_doi_bare() {
        assert_eq!(unversioned_doi("10.1/abc.v4"), "10.1/abc");
    }

    #[test]
    fn test_unversioned_doi_short_url() {
        assert_eq!(unversioned_doi("https://doi.org"), "");
    }

    #[test]
    fn test_publisher_doi() {
        assert_eq!(publisher_doi("https://doi.org/10.1234/xyz"), "1234");
        assert_eq!(publisher_doi("10.1234/xyz"), "");
        assert_eq!(publisher_doi(""), "");
    }

    #[test]
    fn test_derive_absent_doi() {
        assert_eq!(DoiFields::derive(None), DoiFields::default());
    }

    #[test]
    fn test_derive_versioned_doi() {
        let fields = DoiFields::derive(Some("https://doi.org/10.5281/zenodo.7.v3"));
        assert_eq!(fields.version, Some(3));
        assert_eq!(fields.unversioned, "10.5281/zenodo.7");
        assert_eq!(fields.publisher, "5281");
    }
}
