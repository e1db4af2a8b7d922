//! End-to-end identification flows over the nullable infrastructure.

use std::sync::Arc;

use proptest::prelude::*;

use ident_identity::{
    transact, ExternalAccountLink, IdentityError, IdentityRegistry, NewIdentification, Violation,
};
use ident_nullables::{NullClock, NullDatabase, NullDelivery, NullProofChecker};
use ident_store::{Database, IdentificationStore, WriteTxn};
use ident_types::{
    Clock, Identification, IdentificationStatus, IdentificationType, StrategyLimitsOverride,
    TenantId, TenantSettings, User, UserId, Verification, VerificationOutcome,
};
use ident_utils::LogFormat;
use ident_verification::{status, Proof, StrategyCatalog, VerificationError, VerificationStatus};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    db: NullDatabase,
    delivery: Arc<NullDelivery>,
    checker: Arc<NullProofChecker>,
    clock: Arc<NullClock>,
    registry: IdentityRegistry,
    settings: TenantSettings,
    tenant: TenantId,
}

impl Harness {
    fn new(settings: TenantSettings) -> Self {
        ident_utils::init_tracing(LogFormat::Human, "warn");
        let delivery = Arc::new(NullDelivery::new());
        let checker = Arc::new(NullProofChecker::new());
        let clock = Arc::new(NullClock::new(1_000));
        let registry = IdentityRegistry::new(delivery.clone(), checker.clone(), clock.clone());
        Self {
            db: NullDatabase::new(),
            delivery,
            checker,
            clock,
            registry,
            settings,
            tenant: TenantId::new("ins_test"),
        }
    }

    fn dev() -> Self {
        Self::new(TenantSettings::dev_default())
    }

    fn user(&self, id: &str) -> UserId {
        let user = UserId::new(id);
        self.db
            .seed_user(User::new(user.clone(), self.tenant.clone()))
            .unwrap();
        user
    }

    fn create(
        &self,
        user: Option<&UserId>,
        kind: IdentificationType,
        raw: &str,
    ) -> Result<Identification, IdentityError> {
        self.clock.advance(1);
        let mut new = NewIdentification::new(self.tenant.clone(), kind, raw);
        new.user_id = user.cloned();
        transact(&self.db, |tx| {
            self.registry.create_identification(tx, &self.settings, new)
        })
    }

    fn prepare(&self, ident: &Identification, strategy: &str) -> Result<Verification, IdentityError> {
        transact(&self.db, |tx| {
            self.registry
                .prepare_verification(tx, &self.settings, ident, strategy, None)
        })
    }

    fn attempt(&self, ident: &Identification, proof: Proof) -> Result<Identification, IdentityError> {
        transact(&self.db, |tx| {
            self.registry
                .attempt_verification(tx, &self.settings, ident, &proof)
        })
    }

    fn verify_by_code(&self, ident: &Identification, strategy: &str) -> Identification {
        self.prepare(ident, strategy).unwrap();
        let to = ident.identifier.as_deref().unwrap();
        let code = self.delivery.last_code_for(to).unwrap();
        self.attempt(ident, Proof::Code(code)).unwrap()
    }

    fn add_verified_email(&self, user: &UserId, email: &str) -> Identification {
        let ident = self
            .create(Some(user), IdentificationType::EmailAddress, email)
            .unwrap();
        self.verify_by_code(&ident, "email_code")
    }

    fn add_verified_phone(&self, user: &UserId, phone: &str) -> Identification {
        let ident = self
            .create(Some(user), IdentificationType::PhoneNumber, phone)
            .unwrap();
        self.verify_by_code(&ident, "phone_code")
    }

    fn identifications(&self, user: &UserId) -> Vec<Identification> {
        let tx = self.db.begin().unwrap();
        tx.identifications_for_user(&self.tenant, user).unwrap()
    }

    fn reload(&self, ident: &Identification) -> Identification {
        self.db.committed_identification(&ident.id).unwrap()
    }

    fn assert_pointers_verified(&self, user: &UserId) {
        let user = self.db.committed_user(user).unwrap();
        for (kind, id) in user.pointers() {
            let target = self
                .db
                .committed_identification(id)
                .unwrap_or_else(|| panic!("pointer {id} dangles"));
            assert_eq!(target.kind, kind);
            assert!(target.is_verified(), "pointer {id} references unverified row");
        }
    }
}

fn wrong_code(real: &str) -> String {
    let wrong = if real == "000000" { "111111" } else { "000000" };
    wrong.to_string()
}

// ---------------------------------------------------------------------------
// Uniqueness
// ---------------------------------------------------------------------------

#[test]
fn case_variant_of_verified_email_conflicts_for_other_user() {
    let h = Harness::dev();
    let alice = h.user("user_alice");
    let bob = h.user("user_bob");

    let first = h.add_verified_email(&alice, "USER@Example.com");
    assert_eq!(first.canonical_identifier.as_deref(), Some("user@example.com"));
    assert!(first.is_verified());

    let err = h
        .create(Some(&bob), IdentificationType::EmailAddress, "user@EXAMPLE.com")
        .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));
    assert_eq!(err.http_status(), 409);
    assert!(h.identifications(&bob).is_empty());
}

#[test]
fn unverified_rows_may_share_a_canonical_form() {
    let h = Harness::dev();
    let alice = h.user("user_alice");
    let bob = h.user("user_bob");
    h.create(Some(&alice), IdentificationType::EmailAddress, "shared@example.com")
        .unwrap();
    h.create(Some(&bob), IdentificationType::EmailAddress, "Shared@example.com")
        .unwrap();
}

#[test]
fn concurrent_verification_loser_gets_conflict_at_commit() {
    let h = Harness::dev();
    let alice = h.user("user_alice");
    let bob = h.user("user_bob");
    let a = h
        .create(Some(&alice), IdentificationType::EmailAddress, "race@example.com")
        .unwrap();
    let b = h
        .create(Some(&bob), IdentificationType::EmailAddress, "race@example.com")
        .unwrap();
    h.prepare(&a, "email_code").unwrap();
    let code_a = h.delivery.last_code_for("race@example.com").unwrap();
    h.prepare(&b, "email_code").unwrap();
    let code_b = h.delivery.last_code_for("race@example.com").unwrap();

    let mut tx_a = h.db.begin().unwrap();
    let mut tx_b = h.db.begin().unwrap();
    h.registry
        .attempt_verification(&mut tx_a, &h.settings, &a, &Proof::Code(code_a))
        .unwrap();
    h.registry
        .attempt_verification(&mut tx_b, &h.settings, &b, &Proof::Code(code_b))
        .unwrap();
    tx_a.commit().unwrap();
    let err = IdentityError::from(tx_b.commit().unwrap_err());
    assert!(matches!(err, IdentityError::Conflict(_)));

    assert!(h.reload(&a).is_verified());
    assert!(!h.reload(&b).is_verified());
    h.assert_pointers_verified(&bob);
}

#[test]
fn exclusive_reservation_claims_the_slot() {
    let h = Harness::dev();
    let held = h
        .create(None, IdentificationType::EmailAddress, "held@example.com")
        .unwrap();
    let reserved = transact(&h.db, |tx| h.registry.reserve(tx, &h.settings, &held)).unwrap();
    assert_eq!(reserved.status, IdentificationStatus::Reserved);
    assert!(reserved.exclusive_reservation);

    let err = h
        .create(None, IdentificationType::EmailAddress, "HELD@example.com")
        .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));
}

#[test]
fn shared_reservation_leaves_the_slot_open() {
    let h = Harness::new(TenantSettings {
        reserved_identifiers_are_unique: false,
        ..TenantSettings::dev_default()
    });
    let held = h
        .create(None, IdentificationType::EmailAddress, "held@example.com")
        .unwrap();
    transact(&h.db, |tx| h.registry.reserve(tx, &h.settings, &held)).unwrap();
    h.create(None, IdentificationType::EmailAddress, "held@example.com")
        .unwrap();
}

#[test]
fn malformed_identifier_is_validation_error() {
    let h = Harness::dev();
    let alice = h.user("user_alice");
    let err = h
        .create(Some(&alice), IdentificationType::EmailAddress, "not-an-email")
        .unwrap_err();
    assert!(matches!(err, IdentityError::Validation(_)));
    let err = h
        .create(Some(&alice), IdentificationType::PhoneNumber, "call me")
        .unwrap_err();
    assert!(matches!(err, IdentityError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Minimum verified
// ---------------------------------------------------------------------------

#[test]
fn unverifying_the_only_verified_identifier_is_rejected() {
    let h = Harness::new(TenantSettings {
        require_verified_identifier: true,
        ..TenantSettings::dev_default()
    });
    let user = h.user("user_1");
    let phone = h.add_verified_phone(&user, "+1 555 010 0001");

    let err = transact(&h.db, |tx| h.registry.unverify(tx, &h.settings, &user, &phone)).unwrap_err();
    assert!(matches!(
        err,
        IdentityError::InvariantViolation(Violation::LastVerifiedIdentification)
    ));
    assert!(h.reload(&phone).is_verified());
}

#[test]
fn required_type_keeps_its_last_verified_row() {
    let mut settings = TenantSettings::dev_default();
    settings.attributes.phone_number.required = true;
    let h = Harness::new(settings);
    let user = h.user("user_1");
    h.add_verified_email(&user, "jane@example.com");
    let phone = h.add_verified_phone(&user, "+1 555 010 0001");

    let err = transact(&h.db, |tx| h.registry.delete(tx, &h.settings, &user, &phone)).unwrap_err();
    assert!(matches!(
        err,
        IdentityError::InvariantViolation(Violation::LastRequiredVerified {
            kind: IdentificationType::PhoneNumber
        })
    ));

    h.add_verified_phone(&user, "+1 555 010 0002");
    transact(&h.db, |tx| h.registry.delete(tx, &h.settings, &user, &phone)).unwrap();
    h.assert_pointers_verified(&user);
}

#[test]
fn unverify_clears_verification_and_primary() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let email = h.add_verified_email(&user, "jane@example.com");
    let verification = email.verification_id.clone().unwrap();

    let cleared = transact(&h.db, |tx| h.registry.unverify(tx, &h.settings, &user, &email)).unwrap();
    assert_eq!(cleared.status, IdentificationStatus::NotSet);
    assert!(cleared.verification_id.is_none());
    assert!(h.db.committed_verification(&verification).is_none());
    assert!(h.db.committed_user(&user).unwrap().primary_email_address_id.is_none());
    h.assert_pointers_verified(&user);
}

// ---------------------------------------------------------------------------
// Attempts, expiry and infrastructure failures
// ---------------------------------------------------------------------------

#[test]
fn fourth_code_attempt_rejected_after_three_mismatches() {
    let mut settings = TenantSettings::dev_default();
    settings.strategy_limits.insert(
        "phone_code".into(),
        StrategyLimitsOverride {
            max_attempts: Some(3),
            ttl_secs: None,
        },
    );
    let h = Harness::new(settings);
    let user = h.user("user_1");
    let phone = h
        .create(Some(&user), IdentificationType::PhoneNumber, "+1 555 010 0001")
        .unwrap();
    let verification = h.prepare(&phone, "phone_code").unwrap();
    let code = h.delivery.last_code_for("+1 555 010 0001").unwrap();

    for remaining in [2, 1, 0] {
        let err = h.attempt(&phone, Proof::Code(wrong_code(&code))).unwrap_err();
        assert!(err.commits_transaction());
        match err {
            IdentityError::Verification(VerificationError::InvalidCode { remaining: r }) => {
                assert_eq!(r, remaining)
            }
            other => panic!("expected invalid code, got {other:?}"),
        }
    }

    let stored = h.db.committed_verification(&verification.id).unwrap();
    assert_eq!(stored.attempts, 3);
    let limits = StrategyCatalog::limits(&stored.strategy, &h.settings);
    assert_eq!(status(&stored, limits, h.clock.now()), VerificationStatus::Failed);

    let err = h.attempt(&phone, Proof::Code(code)).unwrap_err();
    assert!(matches!(err, IdentityError::Verification(VerificationError::Failed)));
    assert_eq!(h.db.committed_verification(&verification.id).unwrap().attempts, 3);
    assert_eq!(h.checker.calls(), 0);
    assert!(!h.reload(&phone).is_verified());
}

const WALLET: &str = "0x52908400098527886E0F7030069857D2E4169EE7";

#[test]
fn exhausted_signature_attempts_skip_the_checker() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let wallet = h
        .create(Some(&user), IdentificationType::Web3Wallet, WALLET)
        .unwrap();
    h.checker.accept(Proof::Web3Signature("0xsigned".into()));
    h.prepare(&wallet, "web3_signature").unwrap();

    for _ in 0..3 {
        let err = h.attempt(&wallet, Proof::Web3Signature("0xforged".into())).unwrap_err();
        assert!(matches!(
            err,
            IdentityError::Verification(VerificationError::InvalidProof { .. })
        ));
    }
    assert_eq!(h.checker.calls(), 3);

    let err = h
        .attempt(&wallet, Proof::Web3Signature("0xsigned".into()))
        .unwrap_err();
    assert!(matches!(err, IdentityError::Verification(VerificationError::Failed)));
    assert_eq!(h.checker.calls(), 3);
    assert!(!h.reload(&wallet).is_verified());
}

#[test]
fn password_cannot_verify_an_identifier() {
    let h = Harness::dev();
    let attacker = h.user("user_attacker");
    let victim = h.user("user_victim");
    h.checker.accept(Proof::Password("attacker secret".into()));
    let email = h
        .create(Some(&attacker), IdentificationType::EmailAddress, "victim@example.com")
        .unwrap();
    let phone = h
        .create(Some(&attacker), IdentificationType::PhoneNumber, "+1 555 010 0009")
        .unwrap();

    for ident in [&email, &phone] {
        let err = h.prepare(ident, "password").unwrap_err();
        assert!(matches!(err, IdentityError::InvalidParameter(_)), "{err:?}");
    }
    assert_eq!(h.db.verification_count(), 0);
    assert_eq!(h.checker.calls(), 0);
    assert!(!h.reload(&email).is_verified());
    assert!(h.db.committed_user(&attacker).unwrap().primary_email_address_id.is_none());

    let own = h.add_verified_email(&victim, "victim@example.com");
    assert!(own.is_verified());
}

#[test]
fn expired_verification_rejects_correct_code() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let email = h
        .create(Some(&user), IdentificationType::EmailAddress, "jane@example.com")
        .unwrap();
    let verification = h.prepare(&email, "email_code").unwrap();
    let code = h.delivery.last_code_for("jane@example.com").unwrap();

    h.clock.advance(600);
    let err = h.attempt(&email, Proof::Code(code)).unwrap_err();
    assert!(matches!(err, IdentityError::Verification(VerificationError::Expired)));
    assert!(!err.commits_transaction());
    assert_eq!(h.db.committed_verification(&verification.id).unwrap().attempts, 0);
}

#[test]
fn delivery_failure_rolls_back_the_verification() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let email = h
        .create(Some(&user), IdentificationType::EmailAddress, "jane@example.com")
        .unwrap();
    h.delivery.set_failing(true);

    let err = h.prepare(&email, "email_code").unwrap_err();
    assert!(matches!(err, IdentityError::Unexpected(_)));
    assert_eq!(err.http_status(), 500);
    assert_eq!(h.db.verification_count(), 0);
    assert!(h.reload(&email).verification_id.is_none());
}

#[test]
fn checker_outage_does_not_consume_an_attempt() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let wallet = h
        .create(Some(&user), IdentificationType::Web3Wallet, WALLET)
        .unwrap();
    let verification = h.prepare(&wallet, "web3_signature").unwrap();
    h.checker.set_unavailable(true);

    let err = h.attempt(&wallet, Proof::Web3Signature("0xsigned".into())).unwrap_err();
    assert!(matches!(err, IdentityError::Unexpected(_)));
    assert_eq!(h.db.committed_verification(&verification.id).unwrap().attempts, 0);
}

#[test]
fn unknown_or_disabled_strategies_are_invalid_parameters() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let email = h
        .create(Some(&user), IdentificationType::EmailAddress, "jane@example.com")
        .unwrap();
    for key in ["carrier_pigeon", "saml", "phone_code", "admin", "password", "totp"] {
        let err = h.prepare(&email, key).unwrap_err();
        assert!(
            matches!(err, IdentityError::InvalidParameter(_)),
            "{key}: {err:?}"
        );
    }
    assert_eq!(h.db.verification_count(), 0);
}

#[test]
fn email_link_records_the_verifying_client() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let email = h
        .create(Some(&user), IdentificationType::EmailAddress, "jane@example.com")
        .unwrap();
    let verification = h.prepare(&email, "email_link").unwrap();
    let token = h.delivery.last_link_token_for("jane@example.com").unwrap();

    let verified = h
        .attempt(
            &email,
            Proof::LinkToken {
                token,
                client_id: Some("client_1".into()),
            },
        )
        .unwrap();
    assert!(verified.is_verified());
    let stored = h.db.committed_verification(&verification.id).unwrap();
    assert_eq!(stored.outcome, VerificationOutcome::Verified);
    assert_eq!(stored.verified_at_client_id.as_deref(), Some("client_1"));
    assert_eq!(stored.identification_id.as_ref(), Some(&email.id));
}

#[test]
fn preparing_again_replaces_the_previous_verification() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let email = h
        .create(Some(&user), IdentificationType::EmailAddress, "jane@example.com")
        .unwrap();
    let first = h.prepare(&email, "email_code").unwrap();
    let second = h.prepare(&email, "email_code").unwrap();

    assert!(h.db.committed_verification(&first.id).is_none());
    assert_eq!(h.reload(&email).verification_id, Some(second.id));
    assert_eq!(h.db.verification_count(), 1);
}

// ---------------------------------------------------------------------------
// Linked children and deletion
// ---------------------------------------------------------------------------

fn google_link(h: &Harness, subject: &str, email: Option<&str>) -> ExternalAccountLink {
    ExternalAccountLink {
        tenant_id: h.tenant.clone(),
        kind: IdentificationType::OAuth("google".into()),
        provider_user_id: subject.into(),
        email_address: email.map(str::to_string),
        email_verified: email.is_some(),
    }
}

#[test]
fn oauth_parent_cannot_be_deleted_before_its_email_child() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let oauth = transact(&h.db, |tx| {
        h.registry.connect_external_account(
            tx,
            &h.settings,
            &user,
            google_link(&h, "google-sub-1", Some("Jane@Example.com")),
        )
    })
    .unwrap();
    assert!(oauth.is_verified());
    assert!(oauth.external_account_id.is_some());
    assert_eq!(h.db.external_account_count(), 1);

    let email = h
        .identifications(&user)
        .into_iter()
        .find(|i| i.kind == IdentificationType::EmailAddress)
        .unwrap();
    assert!(email.is_verified());
    assert!(email.has_parent(&oauth.id));
    assert_eq!(
        h.db.committed_user(&user).unwrap().primary_email_address_id,
        Some(email.id.clone())
    );

    let err = transact(&h.db, |tx| h.registry.delete(tx, &h.settings, &user, &oauth)).unwrap_err();
    assert!(matches!(
        err,
        IdentityError::InvariantViolation(Violation::ParentOfLinkedChildren { children: 1 })
    ));
    let err = transact(&h.db, |tx| h.registry.unverify(tx, &h.settings, &user, &email)).unwrap_err();
    assert!(matches!(
        err,
        IdentityError::InvariantViolation(Violation::LinkedChildUnverify)
    ));

    transact(&h.db, |tx| h.registry.delete(tx, &h.settings, &user, &email)).unwrap();
    let deleted = transact(&h.db, |tx| h.registry.delete(tx, &h.settings, &user, &oauth)).unwrap();
    assert_eq!(deleted.object, "oauth_google");
    assert!(deleted.deleted);
    assert_eq!(h.db.external_account_count(), 0);
    assert!(h.identifications(&user).is_empty());
    h.assert_pointers_verified(&user);
}

#[test]
fn reconnecting_is_idempotent_and_replaces_stale_rows() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let stale = h
        .create(None, IdentificationType::OAuth("google".into()), "google-sub-9")
        .unwrap();

    let first = transact(&h.db, |tx| {
        h.registry
            .connect_external_account(tx, &h.settings, &user, google_link(&h, "google-sub-9", None))
    })
    .unwrap();
    assert!(h.db.committed_identification(&stale.id).is_none());

    let again = transact(&h.db, |tx| {
        h.registry
            .connect_external_account(tx, &h.settings, &user, google_link(&h, "google-sub-9", None))
    })
    .unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(h.db.external_account_count(), 1);
}

#[test]
fn provider_email_claimed_elsewhere_is_left_unlinked() {
    let h = Harness::dev();
    let alice = h.user("user_alice");
    let bob = h.user("user_bob");
    let alices = h.add_verified_email(&alice, "shared@example.com");

    let oauth = transact(&h.db, |tx| {
        h.registry.connect_external_account(
            tx,
            &h.settings,
            &bob,
            google_link(&h, "google-sub-7", Some("Shared@example.com")),
        )
    })
    .unwrap();
    assert!(oauth.is_verified());
    assert_eq!(h.db.external_account_count(), 1);

    let bobs = h.identifications(&bob);
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].id, oauth.id);
    assert!(h.db.committed_user(&bob).unwrap().primary_email_address_id.is_none());
    assert!(h.reload(&alices).parent_identifications.is_empty());
}

#[test]
fn only_provider_types_connect_as_external_accounts() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let mut link = google_link(&h, "jane@example.com", None);
    link.kind = IdentificationType::EmailAddress;
    let err = transact(&h.db, |tx| {
        h.registry.connect_external_account(tx, &h.settings, &user, link)
    })
    .unwrap_err();
    assert!(matches!(err, IdentityError::InvalidParameter(_)));
    assert_eq!(h.db.external_account_count(), 0);
}

#[test]
fn provider_subject_owned_by_another_user_conflicts() {
    let h = Harness::dev();
    let alice = h.user("user_alice");
    let bob = h.user("user_bob");
    transact(&h.db, |tx| {
        h.registry
            .connect_external_account(tx, &h.settings, &alice, google_link(&h, "google-sub-1", None))
    })
    .unwrap();
    let err = transact(&h.db, |tx| {
        h.registry
            .connect_external_account(tx, &h.settings, &bob, google_link(&h, "google-sub-1", None))
    })
    .unwrap_err();
    assert!(matches!(err, IdentityError::Conflict(_)));
    assert_eq!(h.db.external_account_count(), 1);
}

#[test]
fn deleting_unreferenced_identification_removes_its_verification() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let email = h.add_verified_email(&user, "jane@example.com");
    let verification = email.verification_id.clone().unwrap();

    let deleted = transact(&h.db, |tx| h.registry.delete(tx, &h.settings, &user, &email)).unwrap();
    assert_eq!(deleted.object, "email_address");
    assert_eq!(deleted.id, email.id);
    assert!(h.db.committed_identification(&email.id).is_none());
    assert!(h.db.committed_verification(&verification).is_none());
}

#[test]
fn deleting_another_users_identification_is_not_found() {
    let h = Harness::dev();
    let alice = h.user("user_alice");
    let bob = h.user("user_bob");
    let email = h.add_verified_email(&alice, "alice@example.com");
    let err = transact(&h.db, |tx| h.registry.delete(tx, &h.settings, &bob, &email)).unwrap_err();
    assert!(matches!(err, IdentityError::NotFound(_)));
}

// ---------------------------------------------------------------------------
// Primary identifiers
// ---------------------------------------------------------------------------

#[test]
fn first_verified_email_becomes_primary_and_deletion_promotes_oldest() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let first = h.add_verified_email(&user, "one@example.com");
    let second = h.add_verified_email(&user, "two@example.com");
    h.add_verified_email(&user, "three@example.com");
    assert_eq!(
        h.db.committed_user(&user).unwrap().primary_email_address_id,
        Some(first.id.clone())
    );

    transact(&h.db, |tx| h.registry.delete(tx, &h.settings, &user, &first)).unwrap();
    assert_eq!(
        h.db.committed_user(&user).unwrap().primary_email_address_id,
        Some(second.id)
    );
    h.assert_pointers_verified(&user);
}

#[test]
fn primary_is_moved_never_unset() {
    let h = Harness::dev();
    let user = h.user("user_1");
    h.add_verified_email(&user, "one@example.com");
    let second = h.add_verified_email(&user, "two@example.com");
    let pending = h
        .create(Some(&user), IdentificationType::EmailAddress, "three@example.com")
        .unwrap();

    let updated = transact(&h.db, |tx| {
        h.registry.set_primary(tx, &h.settings, &user, &second, true)
    })
    .unwrap();
    assert_eq!(updated.primary_email_address_id, Some(second.id.clone()));

    let err = transact(&h.db, |tx| {
        h.registry.set_primary(tx, &h.settings, &user, &second, false)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        IdentityError::InvariantViolation(Violation::PrimaryUnsetRejected)
    ));

    let err = transact(&h.db, |tx| {
        h.registry.set_primary(tx, &h.settings, &user, &pending, true)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        IdentityError::InvariantViolation(Violation::PrimaryRequiresVerified)
    ));
}

#[test]
fn username_is_verified_on_creation() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let name = h
        .create(Some(&user), IdentificationType::Username, "Jane_Doe")
        .unwrap();
    assert!(name.is_verified());
    assert_eq!(name.canonical_identifier.as_deref(), Some("jane_doe"));
    assert_eq!(h.db.committed_user(&user).unwrap().username_id, Some(name.id));
}

#[test]
fn claiming_a_verified_sign_up_email_assigns_primary() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let email = h
        .create(None, IdentificationType::EmailAddress, "signup@example.com")
        .unwrap();
    let verified = h.verify_by_code(&email, "email_code");
    assert!(verified.is_verified());
    assert!(verified.user_id.is_none());

    let claimed = transact(&h.db, |tx| h.registry.claim(tx, &h.settings, &email, &user)).unwrap();
    assert!(claimed.belongs_to(&user));
    assert_eq!(
        h.db.committed_user(&user).unwrap().primary_email_address_id,
        Some(email.id)
    );
}

#[test]
fn admin_verification_finalizes_immediately() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let phone = h
        .create(Some(&user), IdentificationType::PhoneNumber, "+44 20 7946 0000")
        .unwrap();
    let verified = transact(&h.db, |tx| h.registry.admin_verify(tx, &h.settings, &phone)).unwrap();
    assert!(verified.is_verified());
    assert_eq!(
        h.db.committed_user(&user).unwrap().primary_phone_number_id,
        Some(phone.id)
    );
}

#[test]
fn finalize_requires_a_verified_verification() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let email = h
        .create(Some(&user), IdentificationType::EmailAddress, "jane@example.com")
        .unwrap();
    h.prepare(&email, "email_code").unwrap();
    let err = transact(&h.db, |tx| {
        h.registry.finalize_verification(tx, &h.settings, &email)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        IdentityError::InvariantViolation(Violation::VerificationIncomplete)
    ));
}

#[test]
fn verified_email_emits_events_in_order() {
    let h = Harness::dev();
    let user = h.user("user_1");
    h.add_verified_email(&user, "jane@example.com");
    let names: Vec<&str> = h.db.committed_events().iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "identification.created",
            "identification.verified",
            "email_address.verified",
            "user.primary_changed",
        ]
    );
}

// ---------------------------------------------------------------------------
// Second factor
// ---------------------------------------------------------------------------

#[test]
fn first_reserved_phone_stays_default() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let first = h.add_verified_phone(&user, "+1 555 010 0001");
    let second = h.add_verified_phone(&user, "+1 555 010 0002");

    let first = transact(&h.db, |tx| {
        h.registry.reserve_for_second_factor(tx, &h.settings, &user, &first)
    })
    .unwrap();
    assert!(first.default_second_factor);

    let second = transact(&h.db, |tx| {
        h.registry.reserve_for_second_factor(tx, &h.settings, &user, &second)
    })
    .unwrap();
    assert!(second.reserved_for_second_factor);
    assert!(!second.default_second_factor);
    assert!(h.reload(&first).default_second_factor);
}

#[test]
fn default_moves_and_is_inherited_on_release() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let first = h.add_verified_phone(&user, "+1 555 010 0001");
    let second = h.add_verified_phone(&user, "+1 555 010 0002");
    for phone in [&first, &second] {
        transact(&h.db, |tx| {
            h.registry.reserve_for_second_factor(tx, &h.settings, &user, phone)
        })
        .unwrap();
    }

    transact(&h.db, |tx| {
        h.registry.set_default_second_factor(tx, &h.settings, &user, &second)
    })
    .unwrap();
    assert!(!h.reload(&first).default_second_factor);
    assert!(h.reload(&second).default_second_factor);

    transact(&h.db, |tx| h.registry.release_second_factor(tx, &user, &second)).unwrap();
    assert!(h.reload(&first).default_second_factor);
    assert!(!h.reload(&second).reserved_for_second_factor);
}

#[test]
fn only_verified_phones_can_be_second_factors() {
    let h = Harness::dev();
    let user = h.user("user_1");
    let phone = h
        .create(Some(&user), IdentificationType::PhoneNumber, "+1 555 010 0001")
        .unwrap();
    let email = h.add_verified_email(&user, "jane@example.com");

    let err = transact(&h.db, |tx| {
        h.registry.reserve_for_second_factor(tx, &h.settings, &user, &phone)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        IdentityError::InvariantViolation(Violation::SecondFactorRequiresVerified)
    ));
    let err = transact(&h.db, |tx| {
        h.registry.reserve_for_second_factor(tx, &h.settings, &user, &email)
    })
    .unwrap_err();
    assert!(matches!(
        err,
        IdentityError::InvariantViolation(Violation::SecondFactorRequiresPhone)
    ));
}

// ---------------------------------------------------------------------------
// Primary pointer invariant under arbitrary operation sequences
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum Op {
    Add(usize),
    Verify(usize),
    Unverify(usize),
    Delete(usize),
    MakePrimary(usize),
}

fn arb_op() -> impl Strategy<Value = Op> {
    let slot = 0usize..3;
    prop_oneof![
        slot.clone().prop_map(Op::Add),
        slot.clone().prop_map(Op::Verify),
        slot.clone().prop_map(Op::Unverify),
        slot.clone().prop_map(Op::Delete),
        slot.prop_map(Op::MakePrimary),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn primary_pointer_always_references_verified_row(ops in prop::collection::vec(arb_op(), 1..12)) {
        let h = Harness::dev();
        let user = h.user("user_1");
        let mut slots: Vec<Option<Identification>> = vec![None, None, None];

        for op in ops {
            match op {
                Op::Add(i) => {
                    if slots[i].is_none() {
                        let email = format!("user{i}@example.com");
                        slots[i] = h.create(Some(&user), IdentificationType::EmailAddress, &email).ok();
                    }
                }
                Op::Verify(i) => {
                    if let Some(ident) = &slots[i] {
                        let _ = transact(&h.db, |tx| h.registry.admin_verify(tx, &h.settings, ident));
                    }
                }
                Op::Unverify(i) => {
                    if let Some(ident) = &slots[i] {
                        let _ = transact(&h.db, |tx| h.registry.unverify(tx, &h.settings, &user, ident));
                    }
                }
                Op::Delete(i) => {
                    if let Some(ident) = &slots[i] {
                        if transact(&h.db, |tx| h.registry.delete(tx, &h.settings, &user, ident)).is_ok() {
                            slots[i] = None;
                        }
                    }
                }
                Op::MakePrimary(i) => {
                    if let Some(ident) = &slots[i] {
                        let _ = transact(&h.db, |tx| h.registry.set_primary(tx, &h.settings, &user, ident, true));
                    }
                }
            }
            h.assert_pointers_verified(&user);
        }
    }
}
