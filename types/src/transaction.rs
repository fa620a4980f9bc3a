use crate::{
    address::Address,
    hash::{prefixed, sha512_256_prefixed, GROUP_PREFIX, TRANSACTION_PREFIX},
    msgpack::{Item, Map, MsgpackError, ToMsgpack},
};
use data_encoding::BASE32_NOPAD;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Lowest fee the network accepts, in microunits.
pub const MIN_TXN_FEE: u64 = 1000;
/// Largest number of transactions in one atomic group.
pub const MAX_GROUP_SIZE: usize = 16;
pub const NOTE_MAX_LENGTH: usize = 1024;
/// Length of the placeholder signature used when estimating the signed size.
const SIGNATURE_LENGTH: usize = 64;

pub type Digest = [u8; 32];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("note is {len} bytes (max {max})")]
    NoteTooLong { len: usize, max: usize },
    #[error("too many transactions in one group: {got} (max {max})")]
    GroupTooLarge { max: usize, got: usize },
    #[error("cannot group zero transactions")]
    EmptyGroup,
    #[error("box reference to app {0} which is not in the foreign apps")]
    UnknownBoxApp(u64),
    #[error("unknown transaction type: {0:?}")]
    UnknownType(String),
    #[error("encoding failed: {0}")]
    Msgpack(#[from] MsgpackError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransactionType {
    Payment,
    KeyRegistration,
    AssetConfig,
    AssetTransfer,
    AssetFreeze,
    ApplicationCall,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Payment => "pay",
            TransactionType::KeyRegistration => "keyreg",
            TransactionType::AssetConfig => "acfg",
            TransactionType::AssetTransfer => "axfer",
            TransactionType::AssetFreeze => "afrz",
            TransactionType::ApplicationCall => "appl",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pay" => Ok(TransactionType::Payment),
            "keyreg" => Ok(TransactionType::KeyRegistration),
            "acfg" => Ok(TransactionType::AssetConfig),
            "axfer" => Ok(TransactionType::AssetTransfer),
            "afrz" => Ok(TransactionType::AssetFreeze),
            "appl" => Ok(TransactionType::ApplicationCall),
            other => Err(TransactionError::UnknownType(other.to_string())),
        }
    }
}

/// Network parameters a node suggests for new transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuggestedParams {
    /// Fee per byte, or the whole fee when `flat_fee` is set.
    pub fee: u64,
    pub flat_fee: bool,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: Digest,
}

/// Fields shared by every transaction type.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub sender: Address,
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: Digest,
    pub note: Vec<u8>,
    pub lease: Option<Digest>,
    pub rekey_to: Option<Address>,
    pub group: Option<Digest>,
}

impl Header {
    pub fn new(sender: Address, params: &SuggestedParams) -> Self {
        Self {
            sender,
            fee: params.fee,
            first_valid: params.first_valid,
            last_valid: params.last_valid,
            genesis_id: params.genesis_id.clone(),
            genesis_hash: params.genesis_hash,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<Vec<u8>>) -> Self {
        self.note = note.into();
        self
    }

    /// An all-zero lease is treated as no lease.
    #[must_use]
    pub fn with_lease(mut self, lease: Digest) -> Self {
        self.lease = (lease != [0u8; 32]).then_some(lease);
        self
    }

    #[must_use]
    pub fn with_rekey_to(mut self, rekey_to: Address) -> Self {
        self.rekey_to = Some(rekey_to);
        self
    }

    fn write(&self, kind: TransactionType, map: Map) -> Map {
        map.uint("fee", self.fee)
            .uint("fv", self.first_valid)
            .str("gen", &self.genesis_id)
            .item("gh", Item::Bin(self.genesis_hash.to_vec()))
            .opt_bin("grp", self.group.as_ref().map(|g| &g[..]))
            .uint("lv", self.last_valid)
            .opt_bin("lx", self.lease.as_ref().map(|l| &l[..]))
            .bin("note", &self.note)
            .opt_address("rekey", self.rekey_to.as_ref())
            .item("snd", Item::Bin(self.sender.as_bytes().to_vec()))
            .item("type", Item::Str(kind.as_str().to_string()))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PaymentFields {
    pub receiver: Address,
    pub amount: u64,
    pub close_remainder_to: Option<Address>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyRegistrationFields {
    pub vote_key: Option<Digest>,
    pub selection_key: Option<Digest>,
    pub state_proof_key: Option<Vec<u8>>,
    pub vote_first: u64,
    pub vote_last: u64,
    pub vote_key_dilution: u64,
    pub non_participation: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetParams {
    pub total: u64,
    pub decimals: u32,
    pub default_frozen: bool,
    pub unit_name: String,
    pub asset_name: String,
    pub url: String,
    pub metadata_hash: Option<Digest>,
    pub manager: Option<Address>,
    pub reserve: Option<Address>,
    pub freeze: Option<Address>,
    pub clawback: Option<Address>,
}

impl ToMsgpack for AssetParams {
    fn to_msgpack(&self) -> Map {
        Map::new()
            .opt_bin("am", self.metadata_hash.as_ref().map(|h| &h[..]))
            .str("an", &self.asset_name)
            .str("au", &self.url)
            .opt_address("c", self.clawback.as_ref())
            .uint("dc", self.decimals as u64)
            .bool("df", self.default_frozen)
            .opt_address("f", self.freeze.as_ref())
            .opt_address("m", self.manager.as_ref())
            .opt_address("r", self.reserve.as_ref())
            .uint("t", self.total)
            .str("un", &self.unit_name)
    }
}

/// Creates (`asset_id == 0`), reconfigures or destroys (no params) an asset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetConfigFields {
    pub asset_id: u64,
    pub params: Option<AssetParams>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetTransferFields {
    pub asset_id: u64,
    pub amount: u64,
    pub receiver: Address,
    /// Clawback source; set only by the asset's clawback account.
    pub asset_sender: Option<Address>,
    pub close_assets_to: Option<Address>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetFreezeFields {
    pub asset_id: u64,
    pub target: Address,
    pub frozen: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OnComplete {
    #[default]
    NoOp = 0,
    OptIn = 1,
    CloseOut = 2,
    ClearState = 3,
    UpdateApplication = 4,
    DeleteApplication = 5,
}

impl FromStr for OnComplete {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "noop" => Ok(OnComplete::NoOp),
            "optin" => Ok(OnComplete::OptIn),
            "closeout" => Ok(OnComplete::CloseOut),
            "clearstate" => Ok(OnComplete::ClearState),
            "updateapplication" => Ok(OnComplete::UpdateApplication),
            "deleteapplication" => Ok(OnComplete::DeleteApplication),
            other => Err(TransactionError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateSchema {
    pub num_uints: u64,
    pub num_byte_slices: u64,
}

impl ToMsgpack for StateSchema {
    fn to_msgpack(&self) -> Map {
        Map::new()
            .uint("nbs", self.num_byte_slices)
            .uint("nui", self.num_uints)
    }
}

/// A box the called application may touch, by position in the call.
///
/// `app_index` 0 is the called application itself; `i > 0` is
/// `foreign_apps[i - 1]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BoxReference {
    pub app_index: u64,
    pub name: Vec<u8>,
}

impl BoxReference {
    /// Resolve `(app_id, name)` pairs against a call's foreign apps.
    ///
    /// An app id of 0 or `this_app` refers to the called application, unless
    /// it also appears in `foreign_apps`.
    pub fn translate(
        references: &[(u64, Vec<u8>)],
        foreign_apps: &[u64],
        this_app: u64,
    ) -> Result<Vec<BoxReference>, TransactionError> {
        references
            .iter()
            .map(|(app_id, name)| {
                let app_index = match foreign_apps.iter().position(|id| id == app_id) {
                    Some(position) => position as u64 + 1,
                    None if *app_id == 0 || *app_id == this_app => 0,
                    None => return Err(TransactionError::UnknownBoxApp(*app_id)),
                };
                Ok(BoxReference {
                    app_index,
                    name: name.clone(),
                })
            })
            .collect()
    }
}

impl ToMsgpack for BoxReference {
    fn to_msgpack(&self) -> Map {
        Map::new().uint("i", self.app_index).bin("n", &self.name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplicationCallFields {
    /// 0 when creating an application.
    pub app_id: u64,
    pub on_complete: OnComplete,
    pub local_schema: Option<StateSchema>,
    pub global_schema: Option<StateSchema>,
    pub approval_program: Vec<u8>,
    pub clear_program: Vec<u8>,
    pub app_args: Vec<Vec<u8>>,
    pub accounts: Vec<Address>,
    pub foreign_apps: Vec<u64>,
    pub foreign_assets: Vec<u64>,
    pub extra_pages: u32,
    pub boxes: Vec<BoxReference>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionFields {
    Payment(PaymentFields),
    KeyRegistration(KeyRegistrationFields),
    AssetConfig(AssetConfigFields),
    AssetTransfer(AssetTransferFields),
    AssetFreeze(AssetFreezeFields),
    ApplicationCall(ApplicationCallFields),
}

impl TransactionFields {
    pub fn kind(&self) -> TransactionType {
        match self {
            TransactionFields::Payment(_) => TransactionType::Payment,
            TransactionFields::KeyRegistration(_) => TransactionType::KeyRegistration,
            TransactionFields::AssetConfig(_) => TransactionType::AssetConfig,
            TransactionFields::AssetTransfer(_) => TransactionType::AssetTransfer,
            TransactionFields::AssetFreeze(_) => TransactionType::AssetFreeze,
            TransactionFields::ApplicationCall(_) => TransactionType::ApplicationCall,
        }
    }

    fn write(&self, map: Map) -> Map {
        match self {
            TransactionFields::Payment(f) => map
                .uint("amt", f.amount)
                .opt_address("close", f.close_remainder_to.as_ref())
                .address("rcv", &f.receiver),
            TransactionFields::KeyRegistration(f) => map
                .bool("nonpart", f.non_participation)
                .opt_bin("selkey", f.selection_key.as_ref().map(|k| &k[..]))
                .opt_bin("sprfkey", f.state_proof_key.as_deref())
                .uint("votefst", f.vote_first)
                .uint("votekd", f.vote_key_dilution)
                .opt_bin("votekey", f.vote_key.as_ref().map(|k| &k[..]))
                .uint("votelst", f.vote_last),
            TransactionFields::AssetConfig(f) => {
                let map = map.uint("caid", f.asset_id);
                match &f.params {
                    Some(params) => map.map("apar", params.to_msgpack()),
                    None => map,
                }
            }
            TransactionFields::AssetTransfer(f) => map
                .uint("aamt", f.amount)
                .opt_address("aclose", f.close_assets_to.as_ref())
                .address("arcv", &f.receiver)
                .opt_address("asnd", f.asset_sender.as_ref())
                .uint("xaid", f.asset_id),
            TransactionFields::AssetFreeze(f) => map
                .bool("afrz", f.frozen)
                .address("fadd", &f.target)
                .uint("faid", f.asset_id),
            TransactionFields::ApplicationCall(f) => {
                let mut map = map
                    .uint("apid", f.app_id)
                    .uint("apan", f.on_complete as u64)
                    .bin("apap", &f.approval_program)
                    .bin("apsu", &f.clear_program)
                    .array(
                        "apaa",
                        f.app_args.iter().map(|a| Item::Bin(a.clone())).collect(),
                    )
                    .array(
                        "apat",
                        f.accounts
                            .iter()
                            .map(|a| Item::Bin(a.as_bytes().to_vec()))
                            .collect(),
                    )
                    .array("apfa", f.foreign_apps.iter().copied().map(Item::Uint).collect())
                    .array("apas", f.foreign_assets.iter().copied().map(Item::Uint).collect())
                    .uint("apep", f.extra_pages as u64)
                    .array(
                        "apbx",
                        f.boxes.iter().map(|b| Item::Map(b.to_msgpack())).collect(),
                    );
                if let Some(schema) = &f.local_schema {
                    map = map.map("apls", schema.to_msgpack());
                }
                if let Some(schema) = &f.global_schema {
                    map = map.map("apgs", schema.to_msgpack());
                }
                map
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub header: Header,
    pub fields: TransactionFields,
}

impl Transaction {
    pub fn new(header: Header, fields: TransactionFields) -> Result<Self, TransactionError> {
        if header.note.len() > NOTE_MAX_LENGTH {
            return Err(TransactionError::NoteTooLong {
                len: header.note.len(),
                max: NOTE_MAX_LENGTH,
            });
        }
        Ok(Self { header, fields })
    }

    /// Build a transaction whose fee follows `params`: the flat fee as given,
    /// or the per-byte fee times the estimated signed size (at least
    /// [`MIN_TXN_FEE`]).
    pub fn with_params(
        sender: Address,
        params: &SuggestedParams,
        fields: TransactionFields,
        customize: impl FnOnce(Header) -> Header,
    ) -> Result<Self, TransactionError> {
        let mut txn = Self::new(customize(Header::new(sender, params)), fields)?;
        txn.header.fee = params.fee;
        if !params.flat_fee {
            let size = txn.estimate_size()? as u64;
            txn.header.fee = size.saturating_mul(params.fee).max(MIN_TXN_FEE);
        }
        Ok(txn)
    }

    pub fn kind(&self) -> TransactionType {
        self.fields.kind()
    }

    pub fn sender(&self) -> &Address {
        &self.header.sender
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(self.encode_msgpack()?)
    }

    /// The bytes a signer signs: `"TX" || msgpack(txn)`.
    pub fn bytes_to_sign(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(prefixed(TRANSACTION_PREFIX, &self.encode()?))
    }

    pub fn raw_id(&self) -> Result<Digest, TransactionError> {
        Ok(sha512_256_prefixed(TRANSACTION_PREFIX, &self.encode()?))
    }

    /// Base32 transaction id.
    pub fn id(&self) -> Result<String, TransactionError> {
        Ok(BASE32_NOPAD.encode(&self.raw_id()?))
    }

    /// Size of this transaction once wrapped with a single signature.
    pub fn estimate_size(&self) -> Result<usize, TransactionError> {
        let signed = Map::new()
            .bin("sig", &[0xff; SIGNATURE_LENGTH])
            .map("txn", self.to_msgpack());
        Ok(signed.encode()?.len())
    }
}

impl ToMsgpack for Transaction {
    fn to_msgpack(&self) -> Map {
        let map = self.fields.write(Map::new());
        self.header.write(self.kind(), map)
    }
}

/// Group id of `txns`: a hash over the ids of every member.
pub fn compute_group_id(txns: &[Transaction]) -> Result<Digest, TransactionError> {
    if txns.is_empty() {
        return Err(TransactionError::EmptyGroup);
    }
    if txns.len() > MAX_GROUP_SIZE {
        return Err(TransactionError::GroupTooLarge {
            max: MAX_GROUP_SIZE,
            got: txns.len(),
        });
    }
    let ids = txns
        .iter()
        .map(|txn| txn.raw_id().map(|id| Item::Bin(id.to_vec())))
        .collect::<Result<Vec<_>, _>>()?;
    let preimage = Map::new().array("txlist", ids).encode()?;
    Ok(sha512_256_prefixed(GROUP_PREFIX, &preimage))
}

/// Stamp the group id on every transaction. With `sender` set, only the
/// transactions sent by that address are returned.
pub fn assign_group_id(
    mut txns: Vec<Transaction>,
    sender: Option<&Address>,
) -> Result<Vec<Transaction>, TransactionError> {
    let group = compute_group_id(&txns)?;
    for txn in &mut txns {
        txn.header.group = Some(group);
    }
    Ok(match sender {
        Some(sender) => txns.into_iter().filter(|t| t.sender() == sender).collect(),
        None => txns,
    })
}
