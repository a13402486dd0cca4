//! Root facade: wires the codec, store, crdt, access, crypto, events, net,
//! and sync crates into one running peer behind an explicit
//! [`InstanceContext`], per §5/§9's "no process-wide globals" guidance.

mod config;
mod invitation_link;
mod listener;
mod settings;

pub use config::InstanceConfig;
pub use invitation_link::{decode_invitation_link, encode_invitation_link, InvitationLinkError};
pub use listener::{AuthenticatedConnection, IncomingConnectionManager};
pub use settings::Settings;

use anyhow::{Context, Result};
use glyphstore_access::{
    access_from_object, access_recipe, access_to_object, assert_monotonic, id_access_from_object, id_access_recipe,
    id_access_to_object, next_grant, Access, GroupId, IdAccess, Mode, PersonId as AccessPersonId,
};
use glyphstore_codec::{decode, encode, FieldDef, Kind, Object, ObjectHash, Recipe, RecipeRegistry, Value};
use glyphstore_crdt::VersionTree;
use glyphstore_crypto::{generate_default_keypair, KeyStore, Keychain};
use glyphstore_events::{Concurrency, EventBus};
use glyphstore_net::handshake::LocalIdentity;
use glyphstore_net::{Invitation, PairingHost, PairingSuccess};
use glyphstore_store::ObjectStore;
use glyphstore_sync::{Exporter, ExporterEvents, Importer};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Lifecycle/connectivity events an application can subscribe to without
/// reaching into the individual sub-crates (§4.9, §4.10).
#[derive(Debug, Clone)]
pub enum InstanceEvent {
    ListenerOnlineChanged(bool),
    PeerConnected { peer_public_key: [u8; 32] },
    Paired(PairingSuccess),
}

/// What an access grant targets (§3 Access, IdAccess).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantTarget {
    /// An unversioned object, addressed by its content hash.
    Object(ObjectHash),
    /// All versions of an ID-object, addressed by its ID-hash.
    Id(ObjectHash),
}

fn init_logging() {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| "info".to_owned());
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(env))
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

fn keys_recipe() -> Recipe {
    Recipe::new(
        "Keys",
        vec![
            FieldDef::new("publicKey", Kind::Text),
            FieldDef::new("publicSignKey", Kind::Text),
        ],
    )
}

fn decode_hex_field(obj: &Object, name: &str) -> Result<[u8; 32]> {
    let value = obj.field(name).with_context(|| format!("Keys object missing field {name}"))?;
    let Value::Text(hex_str) = value else {
        anyhow::bail!("Keys field {name} is not text");
    };
    let mut out = [0u8; 32];
    hex::decode_to_slice(hex_str, &mut out).with_context(|| format!("Keys field {name} is not 32 bytes of hex"))?;
    Ok(out)
}

/// Loads the existing default identity, or generates and persists a fresh
/// one on first run (§3 "Keys: created once per identity per host"; §4.4).
fn ensure_default_identity(
    store: &ObjectStore,
    registry: &RecipeRegistry,
    keys: &KeyStore,
    keychain: &Keychain,
) -> Result<LocalIdentity> {
    let master = keychain.master_key()?;
    let recipe = registry.get("Keys")?;

    if let Some(keys_hash) = keys.default_keys_hash()? {
        let bytes = store.get(&keys_hash)?;
        let text = std::str::from_utf8(&bytes).context("stored Keys object is not UTF-8")?;
        let obj = decode(registry, text)?;
        let public_key = decode_hex_field(&obj, "publicKey")?;
        let public_sign_key = decode_hex_field(&obj, "publicSignKey")?;
        let secret = keys.load_secret(keys_hash, &master)?;
        return Ok(LocalIdentity {
            public_key,
            secret_key: secret.secret_key,
            public_sign_key,
            secret_sign_key: secret.secret_sign_key,
        });
    }

    let (public, _discard_hash, secret) = generate_default_keypair();
    let object = Object::new(
        "Keys",
        vec![
            ("publicKey", Value::Text(hex::encode(public.public_key))),
            ("publicSignKey", Value::Text(hex::encode(public.public_sign_key))),
        ],
    );
    let microdata = encode(&recipe, &object)?;
    let put = store.put(microdata.as_bytes())?;
    keys.store_secret(put.hash, &secret, &master, true)?;
    Ok(LocalIdentity {
        public_key: public.public_key,
        secret_key: secret.secret_key,
        public_sign_key: public.public_sign_key,
        secret_sign_key: secret.secret_sign_key,
    })
}

const DEFAULT_PAIRING_TTL: Duration = Duration::from_secs(15 * 60);

/// Everything one running peer needs, held behind explicit fields rather
/// than statics (§9 "Global mutable state... make them explicit parameters
/// of an InstanceContext").
pub struct InstanceContext {
    pub store: ObjectStore,
    pub registry: RecipeRegistry,
    pub keychain: Keychain,
    pub keys: KeyStore,
    pub settings: Mutex<Settings>,
    pub connections: IncomingConnectionManager,
    pub pairing: PairingHost,
    pub events: EventBus<InstanceEvent>,
    pub local_identity: LocalIdentity,
    /// Version tree for synced CRDT objects (§4.2, §4.7 "update the
    /// version tree where applicable"); shared between the exporter, which
    /// answers `GetCrdtMetaObject`, and the importer, which populates it.
    pub version_tree: Mutex<VersionTree>,
    config: InstanceConfig,
    db: sled::Db,
}

/// A running peer: one `InstanceContext` plus the lifecycle methods that
/// open and later close it (§4.9, §9).
pub struct Instance {
    context: Arc<InstanceContext>,
}

impl Instance {
    /// Opens (creating on first run) the instance rooted at
    /// `config.instance_dir`, unlocking the keychain with `passphrase` and
    /// establishing the default identity if this is the first run
    /// (§4.4, §4.9).
    pub fn init(config: InstanceConfig, passphrase: &str) -> Result<Self> {
        init_logging();

        std::fs::create_dir_all(&config.instance_dir)?;
        let db = sled::open(config.instance_dir.join("index.sled"))?;
        let store = ObjectStore::open(config.instance_dir.clone(), &db)?;
        let keys = KeyStore::open(&db)?;

        let keychain = Keychain::new(
            config.instance_dir.join("private/keychain_salt"),
            config.instance_dir.join("private/keychain_masterkey"),
        );
        if keychain.salt_path().exists() {
            keychain.unlock(passphrase)?;
        } else {
            keychain.initialize(passphrase)?;
        }

        let registry = RecipeRegistry::new();
        registry.register(keys_recipe());
        registry.register(access_recipe());
        registry.register(id_access_recipe());

        let local_identity = ensure_default_identity(&store, &registry, &keys, &keychain)?;

        let settings = Settings::load(&config.instance_dir)?;
        let events = EventBus::new(Concurrency::Parallel);
        let connections = IncomingConnectionManager::new(local_identity);
        if let Some(comm_server_url) = &config.comm_server_url {
            connections.register_relay(comm_server_url);
        }
        connections.register_direct(&config.direct_endpoint());

        let context = InstanceContext {
            store,
            registry,
            keychain,
            keys,
            settings: Mutex::new(settings),
            connections,
            pairing: PairingHost::new(),
            events,
            local_identity,
            version_tree: Mutex::new(VersionTree::new()),
            config,
            db,
        };

        tracing::info!(listening = ?context.connections.is_online(), "instance initialized");
        let context = Arc::new(context);

        // Weak, not Arc: the context owns `connections`, so a strong
        // reference captured here would keep the context alive forever.
        let context_for_callback = Arc::downgrade(&context);
        context.connections.set_on_connection(move |conn| {
            let Some(context) = context_for_callback.upgrade() else {
                return;
            };
            context.events.emit(
                InstanceEvent::PeerConnected {
                    peer_public_key: conn.peer_public_key,
                },
                |err| tracing::warn!(%err, "peer-connected listener failed"),
            );
        });

        Ok(Self { context })
    }

    pub fn context(&self) -> &Arc<InstanceContext> {
        &self.context
    }

    pub fn local_identity(&self) -> LocalIdentity {
        self.context.local_identity
    }

    /// Issues a fresh pairing invitation bound to this instance's direct
    /// (or relay) endpoint (§4.6 step 1).
    pub fn create_invitation(&self, expected_local_person: AccessPersonId) -> Invitation {
        let endpoint = self
            .context
            .config
            .comm_server_url
            .clone()
            .unwrap_or_else(|| self.context.config.direct_endpoint());
        let expected = *expected_local_person.as_bytes();
        self.context
            .pairing
            .create_invitation(self.context.local_identity.public_key, endpoint, expected, DEFAULT_PAIRING_TTL)
    }

    /// Builds a Chum [`Exporter`] scoped to `remote_person`/`remote_groups`
    /// over this instance's store (§4.7).
    pub fn exporter<'a>(&'a self, remote_person: AccessPersonId, remote_groups: Vec<GroupId>, events: ExporterEvents) -> Exporter<'a> {
        Exporter::new(
            &self.context.store,
            &self.context.registry,
            remote_person,
            remote_groups,
            events,
        )
        .with_version_tree(&self.context.version_tree)
    }

    /// Builds a Chum [`Importer`] driving sync into this instance's store
    /// (§4.7).
    pub fn importer(&self, keep_running: bool) -> Importer<'_> {
        Importer::new(&self.context.store, keep_running).with_version_tree(&self.context.version_tree)
    }

    /// Grants `persons`/`groups` access to `target`, merging with (or
    /// replacing, per `mode`) `previous_grant`'s sets, and records the
    /// reverse-map entries `Exporter::accessible_roots` walks to resolve
    /// what a remote person can sync (§4.7, §4.8). `previous_grant`, when
    /// given, is the hash of the prior Access/IdAccess object for the same
    /// target; omitting it starts a fresh grant.
    pub fn grant_access(
        &self,
        target: GrantTarget,
        previous_grant: Option<ObjectHash>,
        persons: std::collections::BTreeSet<AccessPersonId>,
        groups: std::collections::BTreeSet<GroupId>,
        mode: Mode,
    ) -> Result<ObjectHash> {
        match target {
            GrantTarget::Object(target_hash) => {
                let previous = previous_grant.map(|hash| self.load_access(hash)).transpose()?;
                let (new_persons, new_groups) = next_grant(
                    previous.as_ref().map(|a| (&a.persons, &a.groups)),
                    &persons,
                    &groups,
                    mode,
                );
                if let Some(previous) = &previous {
                    assert_monotonic(&previous.persons, &previous.groups, &new_persons, &new_groups)?;
                }
                let access = Access {
                    target: target_hash,
                    persons: new_persons,
                    groups: new_groups,
                };
                let recipe = self.context.registry.get("Access")?;
                let microdata = encode(&recipe, &access_to_object(&access))?;
                let put = self.context.store.put(microdata.as_bytes())?;
                for person in &access.persons {
                    self.context.store.record_reference(person, "Person", &put.hash)?;
                }
                for group in &access.groups {
                    self.context.store.record_reference(group, "Group", &put.hash)?;
                }
                Ok(put.hash)
            }
            GrantTarget::Id(target_id) => {
                let previous = previous_grant.map(|hash| self.load_id_access(hash)).transpose()?;
                let (new_persons, new_groups) = next_grant(
                    previous.as_ref().map(|a| (&a.persons, &a.groups)),
                    &persons,
                    &groups,
                    mode,
                );
                if let Some(previous) = &previous {
                    assert_monotonic(&previous.persons, &previous.groups, &new_persons, &new_groups)?;
                }
                let id_access = IdAccess {
                    target_id,
                    persons: new_persons,
                    groups: new_groups,
                };
                let recipe = self.context.registry.get("IdAccess")?;
                let microdata = encode(&recipe, &id_access_to_object(&id_access))?;
                let put = self.context.store.put(microdata.as_bytes())?;
                for person in &id_access.persons {
                    self.context.store.record_reference(person, "Person", &put.hash)?;
                }
                for group in &id_access.groups {
                    self.context.store.record_reference(group, "Group", &put.hash)?;
                }
                Ok(put.hash)
            }
        }
    }

    fn load_access(&self, hash: ObjectHash) -> Result<Access> {
        let bytes = self.context.store.get(&hash)?;
        let text = std::str::from_utf8(&bytes).context("stored Access object is not UTF-8")?;
        let obj = decode(&self.context.registry, text)?;
        access_from_object(&obj).context("object is not a valid Access")
    }

    fn load_id_access(&self, hash: ObjectHash) -> Result<IdAccess> {
        let bytes = self.context.store.get(&hash)?;
        let text = std::str::from_utf8(&bytes).context("stored IdAccess object is not UTF-8")?;
        let obj = decode(&self.context.registry, text)?;
        id_access_from_object(&obj).context("object is not a valid IdAccess")
    }

    /// Flushes settings, locks the keychain, and drops the instance. Takes
    /// `self` by value so the caller cannot use the context afterward
    /// (§4.4 "Lock"; §4.9 listener teardown is the caller's responsibility,
    /// since listener sockets are owned outside this crate).
    pub fn close(self) -> Result<()> {
        close_instance(self.context)
    }
}

/// Standalone form of [`Instance::close`] for callers holding a shared
/// `Arc<InstanceContext>` directly.
pub fn close_instance(context: Arc<InstanceContext>) -> Result<()> {
    context.settings.lock().save()?;
    context.keychain.lock();
    context.db.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> InstanceConfig {
        InstanceConfig::new(dir).with_listener("127.0.0.1", 9001)
    }

    #[test]
    fn init_generates_identity_once_and_reload_reuses_it() {
        let dir = tempfile::tempdir().unwrap();
        let instance = Instance::init(config(dir.path()), "passphrase").unwrap();
        let identity = instance.local_identity();
        instance.close().unwrap();

        let reopened = Instance::init(config(dir.path()), "passphrase").unwrap();
        assert_eq!(reopened.local_identity().public_key, identity.public_key);
    }

    #[test]
    fn wrong_passphrase_on_reopen_fails() {
        let dir = tempfile::tempdir().unwrap();
        let instance = Instance::init(config(dir.path()), "right").unwrap();
        instance.close().unwrap();

        assert!(Instance::init(config(dir.path()), "wrong").is_err());
    }

    #[test]
    fn direct_listener_is_online_after_init() {
        let dir = tempfile::tempdir().unwrap();
        let instance = Instance::init(config(dir.path()), "passphrase").unwrap();
        assert!(instance.context().connections.is_online());
    }

    #[test]
    fn invitation_links_through_encode_decode() {
        let dir = tempfile::tempdir().unwrap();
        let instance = Instance::init(config(dir.path()), "passphrase").unwrap();
        let person = glyphstore_codec::ObjectHash::of(b"local-person");
        let invitation = instance.create_invitation(person);
        let link = encode_invitation_link("https://example.invalid/invite", &invitation);
        let decoded = decode_invitation_link(&link).unwrap();
        assert_eq!(decoded.token, invitation.token);
    }

    #[test]
    fn grant_access_records_reverse_map_for_accessible_roots() {
        let dir = tempfile::tempdir().unwrap();
        let instance = Instance::init(config(dir.path()), "passphrase").unwrap();
        let target = glyphstore_codec::ObjectHash::of(b"note");
        let person: AccessPersonId = glyphstore_codec::ObjectHash::of(b"remote-person");

        let grant_hash = instance
            .grant_access(
                GrantTarget::Object(target),
                None,
                [person].into_iter().collect(),
                std::collections::BTreeSet::new(),
                Mode::Add,
            )
            .unwrap();

        let exporter = instance.exporter(person, vec![], ExporterEvents::default());
        let roots = exporter.accessible_roots().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].hash, target);

        let second_person: AccessPersonId = glyphstore_codec::ObjectHash::of(b"second-person");
        instance
            .grant_access(
                GrantTarget::Object(target),
                Some(grant_hash),
                [second_person].into_iter().collect(),
                std::collections::BTreeSet::new(),
                Mode::Add,
            )
            .unwrap();

        let exporter = instance.exporter(person, vec![], ExporterEvents::default());
        assert_eq!(exporter.accessible_roots().unwrap().len(), 1, "mode=add must not drop the earlier grantee");
    }

    #[test]
    fn grant_access_rejects_shrinking_a_replace_below_the_previous_grant() {
        let dir = tempfile::tempdir().unwrap();
        let instance = Instance::init(config(dir.path()), "passphrase").unwrap();
        let target = glyphstore_codec::ObjectHash::of(b"note");
        let person: AccessPersonId = glyphstore_codec::ObjectHash::of(b"remote-person");

        let grant_hash = instance
            .grant_access(
                GrantTarget::Object(target),
                None,
                [person].into_iter().collect(),
                std::collections::BTreeSet::new(),
                Mode::Add,
            )
            .unwrap();

        // Replace with an empty grantee set is not a superset of the
        // previous grant's persons, violating §3's monotonicity invariant.
        let shrunk = instance.grant_access(
            GrantTarget::Object(target),
            Some(grant_hash),
            std::collections::BTreeSet::new(),
            std::collections::BTreeSet::new(),
            Mode::Replace,
        );
        assert!(shrunk.is_err());
    }
}
