//! Stable cache keys for parsed requests.
//!
//! A fingerprint is the SHA-256 of a canonical text form of the request:
//! selector codes are sorted and deduplicated, so requests that differ
//! only in parameter order or repetition share a key.

use geodata_models::{Selector, SpatialFilter};
use sha2::{Digest, Sha256};

use crate::{ClassifyRequest, TableRequest};

/// Types with a canonical cache key.
pub trait Fingerprint {
    /// Hex-encoded SHA-256 of the canonical request.
    fn fingerprint(&self) -> String;
}

struct Canonical(Sha256);

impl Canonical {
    fn new(endpoint: &str) -> Self {
        let mut canonical = Self(Sha256::new());
        canonical.field("endpoint", [endpoint.to_string()]);
        canonical
    }

    fn field<I: IntoIterator<Item = String>>(&mut self, name: &str, values: I) {
        let mut values: Vec<String> = values.into_iter().collect();
        values.sort();
        values.dedup();

        self.0.update(name.as_bytes());
        self.0.update(b"=");
        self.0.update(values.join(",").as_bytes());
        self.0.update(b"\n");
    }

    fn selector(&mut self, name: &str, selector: &Selector) {
        self.field(
            name,
            selector.singles.iter().cloned().chain(
                selector
                    .ranges
                    .iter()
                    .map(|r| format!("{}...{}", r.start, r.end)),
            ),
        );
    }

    fn spatial(&mut self, filter: Option<&SpatialFilter>) {
        let rendered = filter
            .and_then(|f| serde_json::to_string(f).ok())
            .unwrap_or_default();
        self.field("spatial", [rendered]);
    }

    fn finish(self) -> String {
        hex::encode(self.0.finalize())
    }
}

impl Fingerprint for TableRequest {
    fn fingerprint(&self) -> String {
        let mut c = Canonical::new("query");
        c.field("year", [self.version.census_year.to_string()]);
        c.field("ver", [self.version.ver_string.clone()]);
        c.selector("rows", &self.geographies);
        c.selector("cols", &self.categories);
        c.field("censustable", self.census_tables.iter().cloned());
        c.field("geotype", self.geotypes.iter().map(ToString::to_string));
        c.spatial(self.spatial.as_ref());
        c.field("divide_by", self.divide_by.iter().cloned());
        c.finish()
    }
}

impl Fingerprint for ClassifyRequest {
    fn fingerprint(&self) -> String {
        let mut c = Canonical::new("ckmeans");
        c.field("year", [self.version.census_year.to_string()]);
        c.field("ver", [self.version.ver_string.clone()]);
        c.field("cat", self.categories.iter().cloned());
        c.field("geotype", self.geotypes.iter().map(ToString::to_string));
        c.field("k", [self.k.to_string()]);
        c.field("divide_by", self.divide_by.iter().cloned());
        c.finish()
    }
}

#[cfg(test)]
mod tests {
    use geodata_models::DataVersion;

    use super::*;
    use crate::QueryParams;

    fn table(pairs: &[(&str, &str)]) -> TableRequest {
        let params: QueryParams = pairs.iter().copied().collect();
        TableRequest::from_params(DataVersion::default(), &params).unwrap()
    }

    fn classify(pairs: &[(&str, &str)]) -> ClassifyRequest {
        let params: QueryParams = pairs.iter().copied().collect();
        ClassifyRequest::from_params(DataVersion::default(), &params).unwrap()
    }

    #[test]
    fn order_and_repetition_do_not_matter() {
        let a = table(&[("rows", "E02,E01"), ("cols", "QS1"), ("geotype", "LSOA")]);
        let b = table(&[("rows", "E01"), ("rows", "E02,E01"), ("cols", " QS1 "), ("geotype", "lsoa")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn different_requests_differ() {
        let a = table(&[("rows", "E01")]);
        let b = table(&[("cols", "E01")]);
        let c = table(&[("rows", "E01"), ("bbox", "0,0,1,1")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());

        let mut d = table(&[("rows", "E01")]);
        d.version = DataVersion::new(2021, "1.0");
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn table_keys_cover_census_tables_and_denominator() {
        let a = table(&[("cols", "QS1")]);
        let b = table(&[("cols", "QS1"), ("divide_by", "QS0")]);
        let c = table(&[("cols", "QS1"), ("censustable", "KS")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_ne!(b.fingerprint(), c.fingerprint());
    }

    #[test]
    fn classification_keys_cover_k_and_denominator() {
        let base = [("cat", "QS1"), ("geotype", "LAD"), ("k", "5")];
        let a = classify(&base);
        let b = classify(&[("cat", "QS1"), ("geotype", "LAD"), ("k", "6")]);
        let c = classify(&[("cat", "QS1"), ("geotype", "LAD"), ("k", "5"), ("divide_by", "QS0")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint(), classify(&base).fingerprint());
    }
}
