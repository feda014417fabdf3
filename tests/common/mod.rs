//! An in-memory certificate authority behind the session traits.
#![allow(dead_code)]

use std::collections::HashSet;
use std::ops::Deref;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use der::Decode;
use parking_lot::Mutex;
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::name::Name;
use x509_cert::request::CertReq;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;
use x509_cert::Certificate;

use certkeeper::cert::{CertificateChain, SignedCertificateRequest};
use certkeeper::challenge::ChallengeCoordinator;
use certkeeper::config::{KeystoreSettings, Settings};
use certkeeper::key::{AccountKey, DomainKey};
use certkeeper::orchestrator::{ReloadError, ReloadSignal};
use certkeeper::protocol::{AcmeError, Url};
use certkeeper::session::{
    AuthorizationHandle, Connector, Http01Challenge, Login, OrderHandle, Resource, Session,
    Status,
};

pub const DAY: Duration = Duration::from_secs(86_400);
pub const ALIAS: &str = "example";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn settings(dir: &Path) -> Settings {
    Settings {
        directory_url: "https://ca.test/directory".into(),
        domain: "example.com".into(),
        contact: Some("admin@example.com".into()),
        keystore: KeystoreSettings {
            path: dir.join("keystore.p12"),
            alias: ALIAS.into(),
        },
        account_key_path: dir.join("account.pem"),
        terms_path: dir.join("terms.json"),
        ..Default::default()
    }
}

/// How the validation agent treats a triggered challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    /// Fetch the token from the coordinator and compare it.
    Fetch,
    /// Never fetch the token.
    Ignore,
    /// Offer no HTTP-01 challenge at all.
    NoHttp01,
}

/// What happens to a finalized order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issuance {
    /// Issue after one round of `Retry-After`.
    Issue,
    /// Stay processing forever.
    Stall,
}

pub struct State {
    pub challenges: ChallengeCoordinator,
    pub lifetime: Mutex<Duration>,
    pub validation: Mutex<Validation>,
    pub issuance: Mutex<Issuance>,
    pub terms: Mutex<Option<Url>>,
    pub connects: AtomicUsize,
    pub created_accounts: AtomicUsize,
    pub orders: AtomicUsize,
    pub fetches: AtomicUsize,
    pub finalized: AtomicUsize,
    accounts: Mutex<HashSet<String>>,
    key: DomainKey,
    root: Certificate,
}

/// The certificate authority, also its own [`Connector`].
#[derive(Clone)]
pub struct Authority(Arc<State>);

impl Deref for Authority {
    type Target = State;

    fn deref(&self) -> &State {
        &self.0
    }
}

impl Authority {
    pub fn new(challenges: ChallengeCoordinator) -> Self {
        let key = DomainKey::generate();
        let root = certificate(
            Name::from_str("CN=Test CA").unwrap(),
            SubjectPublicKeyInfoOwned::from_key(key.public_key()).unwrap(),
            &key,
            DAY * 3650,
        );

        Authority(Arc::new(State {
            challenges,
            lifetime: Mutex::new(DAY * 90),
            validation: Mutex::new(Validation::Fetch),
            issuance: Mutex::new(Issuance::Issue),
            terms: Mutex::new(None),
            connects: AtomicUsize::new(0),
            created_accounts: AtomicUsize::new(0),
            orders: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            finalized: AtomicUsize::new(0),
            accounts: Mutex::new(HashSet::new()),
            key,
            root,
        }))
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    fn issue(&self, csr: &SignedCertificateRequest) -> CertificateChain {
        let request = CertReq::from_der(csr.as_ref()).expect("valid CSR");
        let leaf = certificate(
            request.info.subject.clone(),
            request.info.public_key.clone(),
            &self.key,
            *self.lifetime.lock(),
        );
        CertificateChain::new(vec![leaf, self.root.clone()])
    }
}

fn certificate(
    subject: Name,
    public_key: SubjectPublicKeyInfoOwned,
    issuer: &DomainKey,
    lifetime: Duration,
) -> Certificate {
    let signer = issuer.signing_key();
    CertificateBuilder::new(
        Profile::Root,
        SerialNumber::from(rand::random::<u32>()),
        Validity::from_now(lifetime).unwrap(),
        subject,
        public_key,
        &signer,
    )
    .unwrap()
    .build::<p256::ecdsa::DerSignature>()
    .unwrap()
}

fn url(path: &str) -> Url {
    format!("https://ca.test{path}").parse().unwrap()
}

#[async_trait]
impl Connector for Authority {
    async fn connect(&self, _: &Url) -> Result<Arc<dyn Session>, AcmeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl Session for Authority {
    async fn find_account(&self, key: &Arc<AccountKey>) -> Result<Option<Login>, AcmeError> {
        let thumbprint = key.thumbprint();
        if self.accounts.lock().contains(&thumbprint) {
            Ok(Some(Login::new(key.clone(), url(&format!("/acct/{thumbprint}")))))
        } else {
            Ok(None)
        }
    }

    async fn terms_of_service(&self) -> Result<Option<Url>, AcmeError> {
        Ok(self.terms.lock().clone())
    }

    async fn create_account(
        &self,
        key: &Arc<AccountKey>,
        _contact: &[Url],
        terms_agreed: bool,
    ) -> Result<Login, AcmeError> {
        if self.terms.lock().is_some() && !terms_agreed {
            return Err(AcmeError::MissingData("terms of service agreement"));
        }

        let thumbprint = key.thumbprint();
        self.accounts.lock().insert(thumbprint.clone());
        self.created_accounts.fetch_add(1, Ordering::SeqCst);
        Ok(Login::new(key.clone(), url(&format!("/acct/{thumbprint}"))))
    }

    async fn new_order(
        &self,
        login: &Login,
        domain: &str,
    ) -> Result<Box<dyn OrderHandle>, AcmeError> {
        let number = self.orders.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Order {
            authority: self.clone(),
            login: login.clone(),
            domain: domain.to_owned(),
            token: format!("token-{number}"),
            status: Status::Pending,
            retried: false,
            chain: None,
        }))
    }
}

struct Order {
    authority: Authority,
    login: Login,
    domain: String,
    token: String,
    status: Status,
    retried: bool,
    chain: Option<CertificateChain>,
}

#[async_trait]
impl Resource for Order {
    async fn update(&mut self) -> Result<Option<DateTime<Utc>>, AcmeError> {
        if self.chain.is_none() {
            return Ok(None);
        }

        let issuance = *self.authority.issuance.lock();
        match issuance {
            Issuance::Issue if self.retried => {
                self.status = Status::Valid;
                Ok(None)
            }
            Issuance::Issue => {
                self.retried = true;
                Ok(Some(Utc::now() + chrono::Duration::milliseconds(50)))
            }
            Issuance::Stall => Ok(Some(Utc::now() + chrono::Duration::milliseconds(200))),
        }
    }

    fn status(&self) -> Status {
        self.status
    }
}

#[async_trait]
impl OrderHandle for Order {
    async fn authorizations(&self) -> Result<Vec<Box<dyn AuthorizationHandle>>, AcmeError> {
        Ok(vec![Box::new(Authorization {
            authority: self.authority.clone(),
            login: self.login.clone(),
            domain: self.domain.clone(),
            token: self.token.clone(),
            status: Status::Pending,
            validated: AtomicBool::new(false),
        })])
    }

    async fn finalize(&mut self, csr: &SignedCertificateRequest) -> Result<(), AcmeError> {
        self.authority.finalized.fetch_add(1, Ordering::SeqCst);
        self.chain = Some(self.authority.issue(csr));
        self.status = Status::Processing;
        Ok(())
    }

    async fn certificate(&self) -> Result<CertificateChain, AcmeError> {
        match self.status {
            Status::Valid => self
                .chain
                .clone()
                .ok_or(AcmeError::MissingData("certificate")),
            _ => Err(AcmeError::NotReady("certificate")),
        }
    }
}

struct Authorization {
    authority: Authority,
    login: Login,
    domain: String,
    token: String,
    status: Status,
    validated: AtomicBool,
}

#[async_trait]
impl Resource for Authorization {
    async fn update(&mut self) -> Result<Option<DateTime<Utc>>, AcmeError> {
        self.status = if self.validated.load(Ordering::SeqCst) {
            Status::Valid
        } else {
            Status::Invalid
        };
        Ok(None)
    }

    fn status(&self) -> Status {
        self.status
    }
}

#[async_trait]
impl AuthorizationHandle for Authorization {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn http01(&self) -> Option<Http01Challenge> {
        if *self.authority.validation.lock() == Validation::NoHttp01 {
            return None;
        }
        Some(Http01Challenge {
            token: self.token.clone(),
            key_authorization: self.login.key().key_authorization(&self.token),
            url: url(&format!("/chall/{}", self.token)),
        })
    }

    async fn trigger(&self, challenge: &Http01Challenge) -> Result<(), AcmeError> {
        let validation = *self.authority.validation.lock();
        if validation == Validation::Fetch {
            self.authority.fetches.fetch_add(1, Ordering::SeqCst);
            let body = self.authority.challenges.respond(&challenge.token);
            let expected = self.login.key().key_authorization(&challenge.token);
            self.validated.store(body == expected, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Counts reloads, optionally failing them.
#[derive(Default)]
pub struct Reloads {
    pub count: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl ReloadSignal for Reloads {
    async fn reload(&self) -> Result<(), ReloadError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err("server is not listening".into());
        }
        Ok(())
    }
}
