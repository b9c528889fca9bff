//! Two-peer membership exchange over the paginated protocol
//!
//! Peer A holds membership chains, peer B holds none. The exchange runs
//! symmetric rounds until both sides report completion; afterwards B
//! holds exactly the chains relevant to it.

use lattice_store::{AclStore, MemoryKeyStore};
use lattice_trust::testkit::CertAuthority;
use lattice_trust::{
    generate_manifest_digest, Ed25519Verifier, Manifest, MemberType, MembershipReceiver,
    MembershipSender, MembershipStore, PermissionModule, Rule, RuleMember, SecurityGroupId,
    SendCode, TrustAnchor, TrustAnchorStore,
};
use std::sync::Arc;

fn template_rules() -> Vec<Rule> {
    vec![Rule {
        interface_name: "fabric.Lock".into(),
        members: vec![RuleMember {
            name: "*".into(),
            member_type: MemberType::Any,
            action_mask: lattice_trust::policy::ACTION_ALL,
        }],
    }]
}

/// Claim a fresh module whose admin group authority is `authority`
fn claimed_module(authority: &CertAuthority, group: SecurityGroupId) -> PermissionModule {
    let device = CertAuthority::new("device-b");
    let ca = CertAuthority::new("domain-ca");
    let module = PermissionModule::new(
        Arc::new(MemoryKeyStore::new()),
        device.key_info(),
        Arc::new(Ed25519Verifier),
    );
    module.set_manifest_template(&template_rules()).unwrap();
    let digest = generate_manifest_digest(&template_rules()).unwrap();
    let identity = ca.identity_chain(&device, "id-b", Some(digest));
    let manifest = Manifest::new(template_rules(), vec![0]).unwrap();
    module
        .claim(
            TrustAnchor::certificate_authority(ca.key_info()),
            TrustAnchor::security_group_authority(authority.key_info(), group),
            &identity,
            &[manifest],
        )
        .unwrap();
    module
}

#[test]
fn exchange_terminates_and_transfers_exactly_the_relevant_chains() {
    let group_authority = CertAuthority::new("group-authority");
    let stranger = CertAuthority::new("stranger-authority");
    let group = SecurityGroupId::new();
    let device_a = CertAuthority::new("device-a");

    // peer A: raw store halves holding two relevant chains and one
    // chain B's trust can never use
    let a_store = MembershipStore::new(AclStore::new(Arc::new(MemoryKeyStore::new())));
    a_store
        .store_membership(&group_authority.membership_chain(&device_a, "m-1", group))
        .unwrap();
    a_store
        .store_membership(&group_authority.membership_chain(&device_a, "m-2", group))
        .unwrap();
    a_store
        .store_membership(&stranger.membership_chain(&device_a, "m-x", SecurityGroupId::new()))
        .unwrap();

    let a_anchors = TrustAnchorStore::new();
    a_anchors.install(TrustAnchor::security_group_authority(
        group_authority.key_info(),
        group,
    ));

    // peer B: a claimed module that trusts the group authority
    let b_module = claimed_module(&group_authority, group);

    // B knows the group authority as an issuer; A advertises nothing B
    // could send back, so B's relevant set is empty
    let mut a_sender =
        MembershipSender::for_peer(&a_store, &[group_authority.key_info()]).unwrap();
    let mut b_sender = b_module.membership_sender(&[stranger.key_info()]).unwrap();
    let a_receiver = MembershipReceiver::new(
        &a_store,
        &a_anchors,
        &Ed25519Verifier,
    );

    let mut a_finished = false;
    let mut b_finished = false;
    let mut rounds = 0;
    while !(a_finished && b_finished) {
        rounds += 1;
        assert!(rounds <= 8, "exchange did not terminate");
        if !a_finished {
            let unit = a_sender.next_unit();
            a_finished = b_module.receive_membership(&unit).unwrap();
        }
        if !b_finished {
            let unit = b_sender.next_unit();
            b_finished = a_receiver.receive(&unit).unwrap();
        }
    }
    assert!(a_sender.is_done());
    assert!(b_sender.is_done());

    // B ended with exactly the two relevant chains
    let mut serials: Vec<String> = b_module
        .membership_summaries()
        .unwrap()
        .into_iter()
        .map(|summary| summary.serial)
        .collect();
    serials.sort();
    assert_eq!(serials, vec!["m-1".to_string(), "m-2".to_string()]);

    // A's store is untouched by the exchange
    assert_eq!(a_store.all_memberships().unwrap().len(), 3);
}

#[test]
fn replayed_units_are_accepted_idempotently() {
    let group_authority = CertAuthority::new("group-authority");
    let group = SecurityGroupId::new();
    let device_a = CertAuthority::new("device-a");
    let chain = group_authority.membership_chain(&device_a, "m-1", group);

    let b_module = claimed_module(&group_authority, group);
    let unit = lattice_trust::MembershipUnit {
        chain: Some(chain),
        code: SendCode::Last,
    };
    assert!(b_module.receive_membership(&unit).unwrap());
    assert!(b_module.receive_membership(&unit).unwrap());
    assert_eq!(b_module.membership_summaries().unwrap().len(), 1);
}

#[test]
fn install_and_remove_through_the_module() {
    let group_authority = CertAuthority::new("group-authority");
    let group = SecurityGroupId::new();
    let device_a = CertAuthority::new("device-a");
    let chain = group_authority.membership_chain(&device_a, "m-1", group);

    let module = claimed_module(&group_authority, group);
    module.install_membership(&chain).unwrap();
    assert_eq!(
        module.install_membership(&chain).unwrap_err().error_name(),
        Some("DUPLICATE_CERTIFICATE")
    );

    let summary = &module.membership_summaries().unwrap()[0];
    module
        .remove_membership(&summary.serial, &summary.issuer_key_id)
        .unwrap();
    assert!(module.membership_summaries().unwrap().is_empty());
    assert_eq!(
        module
            .remove_membership("m-1", &summary.issuer_key_id)
            .unwrap_err()
            .error_name(),
        Some("CERTIFICATE_NOT_FOUND")
    );
}
