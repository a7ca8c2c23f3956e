//! services/extension_host/src/adapters/verifier.rs
//!
//! Sustainability verification backed by the product catalog. A product counts as
//! verified when its record carries a provenance reference; products the catalog
//! does not know are unverified with a score of 0.

use async_trait::async_trait;
use std::collections::BTreeSet;
use synthstyle_core::domain::{ProductRecord, VerificationResult};
use synthstyle_core::ports::{PortError, PortResult, SustainabilityVerifier};
use tracing::instrument;

use super::backend::BackendClient;

pub struct CatalogVerifier {
    backend: BackendClient,
}

impl CatalogVerifier {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }
}

fn verification_of(product: &ProductRecord) -> VerificationResult {
    let certifications: BTreeSet<&str> = product
        .materials
        .iter()
        .flat_map(|m| m.certifications.iter().map(String::as_str))
        .collect();
    VerificationResult {
        verified: product.blockchain_ref.is_some(),
        score: product.sustainability.overall_score,
        certifications: certifications.into_iter().map(str::to_string).collect(),
    }
}

#[async_trait]
impl SustainabilityVerifier for CatalogVerifier {
    #[instrument(skip(self))]
    async fn verify(&self, product_id: &str) -> PortResult<VerificationResult> {
        match self
            .backend
            .get_json::<ProductRecord>(&format!("/api/products/{}", product_id))
            .await
        {
            Ok(product) => Ok(verification_of(&product)),
            Err(PortError::NotFound(_)) => Ok(VerificationResult::unverified()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provenance_reference_marks_a_product_verified() {
        let product: ProductRecord = serde_json::from_value(json!({
            "id": "p1",
            "name": "Tee",
            "brand": "Patagonia",
            "category": "Tops",
            "price": { "current": 35.0 },
            "materials": [
                { "name": "cotton", "percentage": 60.0, "certifications": ["GOTS", "Fair Trade"] },
                { "name": "hemp", "percentage": 40.0, "certifications": ["GOTS"] }
            ],
            "sustainability": { "overallScore": 81 },
            "blockchainRef": "0xabc"
        }))
        .unwrap();

        let result = verification_of(&product);
        assert!(result.verified);
        assert_eq!(result.score, 81);
        assert_eq!(result.certifications, vec!["Fair Trade", "GOTS"]);
    }

    #[test]
    fn products_without_provenance_keep_their_score() {
        let product: ProductRecord = serde_json::from_value(json!({
            "id": "p2",
            "name": "Jeans",
            "brand": "Levi's",
            "category": "Bottoms",
            "price": { "current": 80.0 },
            "sustainability": { "overallScore": 40 }
        }))
        .unwrap();

        let result = verification_of(&product);
        assert!(!result.verified);
        assert_eq!(result.score, 40);
        assert!(result.certifications.is_empty());
    }
}
