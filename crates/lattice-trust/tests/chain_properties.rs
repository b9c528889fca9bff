//! Property coverage for chain validation over arbitrary chain shapes

use lattice_trust::testkit::CertAuthority;
use lattice_trust::{
    CertificateChain, CertificateUsage, ChainValidator, Ed25519Verifier, SecurityGroupId,
    TrustAnchor, TrustAnchorStore, ValidationOptions,
};
use proptest::prelude::*;

const NOW: u64 = 1_000_000;

/// Build a chain of `depth` authorities above `device`, leaf first,
/// returning the chain and its root authority's key
fn chain_of_depth(
    device: &CertAuthority,
    serial: &str,
    depth: usize,
) -> (CertificateChain, TrustAnchorStore) {
    let authorities: Vec<CertAuthority> = (0..depth)
        .map(|i| CertAuthority::new(&format!("authority-{i}")))
        .collect();

    let mut certs = vec![authorities[0].issue(
        serial,
        device,
        CertificateUsage::Identity,
        SecurityGroupId::nil(),
        None,
    )];
    for i in 0..depth - 1 {
        certs.push(authorities[i + 1].issue(
            &format!("mid-{i}"),
            &authorities[i],
            CertificateUsage::Unrestricted,
            SecurityGroupId::nil(),
            None,
        ));
    }
    certs.push(authorities[depth - 1].self_signed_root("root"));

    let anchors = TrustAnchorStore::new();
    anchors.install(TrustAnchor::certificate_authority(
        authorities[depth - 1].key_info(),
    ));
    let chain = CertificateChain::new(certs).unwrap();
    (chain, anchors)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn issued_chains_validate_at_any_depth(
        depth in 1usize..4,
        serial in "[a-z0-9]{1,12}",
    ) {
        let device = CertAuthority::new("device");
        let (chain, anchors) = chain_of_depth(&device, &serial, depth);
        let validator = ChainValidator::new(&anchors, &Ed25519Verifier);
        prop_assert!(validator.validate_at(&chain, &ValidationOptions::default(), NOW));
    }

    #[test]
    fn tampering_with_any_link_breaks_validation(
        depth in 1usize..4,
        serial in "[a-z0-9]{1,12}",
        link in 0usize..4,
        byte in 0usize..16,
    ) {
        let device = CertAuthority::new("device");
        let (chain, anchors) = chain_of_depth(&device, &serial, depth);

        let mut certs = chain.certs().to_vec();
        let link = link % certs.len();
        let byte = byte % certs[link].signature.len();
        certs[link].signature[byte] ^= 0x01;
        let tampered = CertificateChain::new(certs).unwrap();

        let validator = ChainValidator::new(&anchors, &Ed25519Verifier);
        prop_assert!(!validator.validate_at(&tampered, &ValidationOptions::default(), NOW));
    }

    #[test]
    fn truncating_the_root_loses_trust_closure(
        depth in 2usize..4,
        serial in "[a-z0-9]{1,12}",
    ) {
        let device = CertAuthority::new("device");
        let (chain, anchors) = chain_of_depth(&device, &serial, depth);

        let mut certs = chain.certs().to_vec();
        certs.pop();
        let truncated = CertificateChain::new(certs).unwrap();

        let validator = ChainValidator::new(&anchors, &Ed25519Verifier);
        prop_assert!(!validator.validate_at(&truncated, &ValidationOptions::default(), NOW));
        // structure of the remaining links is still intact
        prop_assert!(validator.validate_at(
            &truncated,
            &ValidationOptions::structure_only(),
            NOW
        ));
    }
}
