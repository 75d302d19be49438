//! Structural parser
//!
//! A streaming state machine that consumes the plaintext body's structural
//! events and incrementally builds the record tree. The machine's state is
//! the current structural context (inside metadata, inside a group, inside
//! an entry's string field, ...) plus a small bag of in-flight values: the
//! pending group stack, the entry under construction, the key/value pair
//! being accumulated. There is deliberately one parser type with all of
//! that state as explicit fields — nothing is shared implicitly.
//!
//! Unknown elements anywhere are skipped wholesale, descendants included,
//! so newer containers with added vocabulary still load. Malformed nesting
//! is a fatal structural error.
//!
//! Protected values are unmasked in document order against the decode's
//! [`RandomStream`]; the stream position only ever advances.

use std::collections::BTreeMap;
use std::io::Read;
use std::mem;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use flate2::read::GzDecoder;

use vaultsync_core::{
    epoch, parse_kdbx, CancelToken, DecodeError, DecodeResult, ObjectId, StatusLogger, Timestamp,
};
use vaultsync_model::{
    CustomIcon, Database, DeletedObject, Entry, Group, Inheritable, ProtectedBinary,
    ProtectedString,
};

use crate::consts::POLL_INTERVAL;
use crate::hashing::HashHandle;
use crate::random_stream::RandomStream;
use crate::xml::{XmlEvent, XmlReader};

/// Element vocabulary of the structural body.
mod el {
    pub const DOCUMENT: &str = "KeePassFile";
    pub const META: &str = "Meta";
    pub const ROOT: &str = "Root";

    pub const GENERATOR: &str = "Generator";
    pub const HEADER_HASH: &str = "HeaderHash";
    pub const DB_NAME: &str = "DatabaseName";
    pub const DB_NAME_CHANGED: &str = "DatabaseNameChanged";
    pub const DB_DESC: &str = "DatabaseDescription";
    pub const DB_DESC_CHANGED: &str = "DatabaseDescriptionChanged";
    pub const DEFAULT_USER: &str = "DefaultUserName";
    pub const DEFAULT_USER_CHANGED: &str = "DefaultUserNameChanged";
    pub const MAINTENANCE_DAYS: &str = "MaintenanceHistoryDays";
    pub const COLOR: &str = "Color";
    pub const MASTER_KEY_CHANGED: &str = "MasterKeyChanged";
    pub const MASTER_KEY_CHANGE_REC: &str = "MasterKeyChangeRec";
    pub const MASTER_KEY_CHANGE_FORCE: &str = "MasterKeyChangeForce";
    pub const MEMORY_PROTECTION: &str = "MemoryProtection";
    pub const PROTECT_TITLE: &str = "ProtectTitle";
    pub const PROTECT_USERNAME: &str = "ProtectUserName";
    pub const PROTECT_PASSWORD: &str = "ProtectPassword";
    pub const PROTECT_URL: &str = "ProtectURL";
    pub const PROTECT_NOTES: &str = "ProtectNotes";
    pub const CUSTOM_ICONS: &str = "CustomIcons";
    pub const ICON: &str = "Icon";
    pub const DATA: &str = "Data";
    pub const RECYCLE_BIN_ENABLED: &str = "RecycleBinEnabled";
    pub const RECYCLE_BIN_UUID: &str = "RecycleBinUUID";
    pub const RECYCLE_BIN_CHANGED: &str = "RecycleBinChanged";
    pub const ENTRY_TEMPLATES: &str = "EntryTemplatesGroup";
    pub const ENTRY_TEMPLATES_CHANGED: &str = "EntryTemplatesGroupChanged";
    pub const HISTORY_MAX_ITEMS: &str = "HistoryMaxItems";
    pub const HISTORY_MAX_SIZE: &str = "HistoryMaxSize";
    pub const LAST_SELECTED_GROUP: &str = "LastSelectedGroup";
    pub const LAST_TOP_VISIBLE_GROUP: &str = "LastTopVisibleGroup";
    pub const BINARIES: &str = "Binaries";
    pub const CUSTOM_DATA: &str = "CustomData";
    pub const ITEM: &str = "Item";

    pub const GROUP: &str = "Group";
    pub const ENTRY: &str = "Entry";
    pub const UUID: &str = "UUID";
    pub const NAME: &str = "Name";
    pub const NOTES: &str = "Notes";
    pub const ICON_ID: &str = "IconID";
    pub const CUSTOM_ICON_UUID: &str = "CustomIconUUID";
    pub const TIMES: &str = "Times";
    pub const CREATION_TIME: &str = "CreationTime";
    pub const LAST_MOD_TIME: &str = "LastModificationTime";
    pub const LAST_ACCESS_TIME: &str = "LastAccessTime";
    pub const EXPIRY_TIME: &str = "ExpiryTime";
    pub const EXPIRES: &str = "Expires";
    pub const USAGE_COUNT: &str = "UsageCount";
    pub const LOCATION_CHANGED: &str = "LocationChanged";
    pub const IS_EXPANDED: &str = "IsExpanded";
    pub const DEFAULT_AUTOTYPE_SEQUENCE: &str = "DefaultAutoTypeSequence";
    pub const ENABLE_AUTOTYPE: &str = "EnableAutoType";
    pub const ENABLE_SEARCHING: &str = "EnableSearching";
    pub const LAST_TOP_VISIBLE_ENTRY: &str = "LastTopVisibleEntry";
    pub const FOREGROUND_COLOR: &str = "ForegroundColor";
    pub const BACKGROUND_COLOR: &str = "BackgroundColor";
    pub const OVERRIDE_URL: &str = "OverrideURL";
    pub const TAGS: &str = "Tags";
    pub const STRING: &str = "String";
    pub const BINARY: &str = "Binary";
    pub const KEY: &str = "Key";
    pub const VALUE: &str = "Value";
    pub const AUTO_TYPE: &str = "AutoType";
    pub const AUTO_TYPE_ENABLED: &str = "Enabled";
    pub const AUTO_TYPE_OBFUSCATION: &str = "DataTransferObfuscation";
    pub const AUTO_TYPE_DEFAULT_SEQ: &str = "DefaultSequence";
    pub const ASSOCIATION: &str = "Association";
    pub const WINDOW: &str = "Window";
    pub const KEYSTROKE_SEQUENCE: &str = "KeystrokeSequence";
    pub const HISTORY: &str = "History";
    pub const DELETED_OBJECTS: &str = "DeletedObjects";
    pub const DELETED_OBJECT: &str = "DeletedObject";
    pub const DELETION_TIME: &str = "DeletionTime";

    pub const ATTR_PROTECTED: &str = "Protected";
    pub const ATTR_PROTECT_IN_MEMORY: &str = "ProtectInMemory";
    pub const ATTR_COMPRESSED: &str = "Compressed";
    pub const ATTR_ID: &str = "ID";
    pub const ATTR_REF: &str = "Ref";
}

/// Current structural context of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Null,
    Document,
    Meta,
    MemoryProtection,
    CustomIcons,
    CustomIcon,
    Binaries,
    CustomData,
    CustomDataItem,
    Root,
    Group,
    GroupTimes,
    Entry,
    EntryTimes,
    EntryString,
    EntryBinary,
    EntryAutoType,
    EntryAutoTypeItem,
    EntryHistory,
    DeletedObjects,
    DeletedObject,
}

/// A group under construction: node fields plus its not-yet-attached
/// children in document order.
struct PendingGroup {
    group: Group,
    subgroups: Vec<PendingGroup>,
    entries: Vec<Entry>,
}

impl PendingGroup {
    fn new() -> Self {
        Self {
            group: Group::with_uuid(ObjectId::NIL, ""),
            subgroups: Vec::new(),
            entries: Vec::new(),
        }
    }
}

/// An open value element whose text is being accumulated.
struct Capture {
    name: String,
    attributes: Vec<(String, String)>,
}

/// Source of decode progress percentages for the status logger.
pub struct ProgressSource {
    handle: Option<HashHandle>,
    total: u64,
}

impl ProgressSource {
    /// No progress information; polls report 0%.
    pub fn none() -> Self {
        Self {
            handle: None,
            total: 0,
        }
    }

    /// Progress from transport position against a known total length.
    pub fn from_transport(handle: HashHandle, total: u64) -> Self {
        Self {
            handle: Some(handle),
            total,
        }
    }

    fn percent(&self) -> u32 {
        match &self.handle {
            Some(handle) if self.total > 0 => {
                (handle.position().saturating_mul(100) / self.total).min(100) as u32
            }
            _ => 0,
        }
    }
}

/// Result of a structural parse.
#[derive(Debug)]
pub enum ParseOutcome {
    /// The whole document was consumed and validated.
    Complete(Database),
    /// The status logger requested a soft stop; partial work is discarded.
    Stopped,
}

/// The streaming structural parser.
pub struct KdbxParser<'a, R: Read> {
    reader: XmlReader<R>,
    random: RandomStream,
    header_hash: [u8; 32],
    cancel: CancelToken,
    logger: &'a mut dyn StatusLogger,
    progress: ProgressSource,

    db: Database,
    ctx: Ctx,
    groups: Vec<PendingGroup>,
    root_group: Option<PendingGroup>,
    entry: Option<Entry>,
    /// The real entry, parked while its history snapshots are built.
    parked_entry: Option<Entry>,
    string_key: Option<String>,
    string_value: Option<ProtectedString>,
    binary_key: Option<String>,
    binary_value: Option<ProtectedBinary>,
    assoc_window: Option<String>,
    assoc_sequence: Option<String>,
    custom_key: Option<String>,
    custom_value: Option<String>,
    icon_uuid: ObjectId,
    icon_data: Vec<u8>,
    deleted_uuid: ObjectId,
    deleted_time: Timestamp,
    binary_pool: BTreeMap<String, ProtectedBinary>,

    capture: Option<Capture>,
    text: String,
    skipping: u32,
    tokens: u32,
}

impl<'a, R: Read> KdbxParser<'a, R> {
    /// Create a parser over a plaintext body stream.
    pub fn new(
        reader: XmlReader<R>,
        random: RandomStream,
        header_hash: [u8; 32],
        cancel: CancelToken,
        logger: &'a mut dyn StatusLogger,
        progress: ProgressSource,
    ) -> Self {
        Self {
            reader,
            random,
            header_hash,
            cancel,
            logger,
            progress,
            db: Database::new(),
            ctx: Ctx::Null,
            groups: Vec::new(),
            root_group: None,
            entry: None,
            parked_entry: None,
            string_key: None,
            string_value: None,
            binary_key: None,
            binary_value: None,
            assoc_window: None,
            assoc_sequence: None,
            custom_key: None,
            custom_value: None,
            icon_uuid: ObjectId::NIL,
            icon_data: Vec::new(),
            deleted_uuid: ObjectId::NIL,
            deleted_time: epoch(),
            binary_pool: BTreeMap::new(),
            capture: None,
            text: String::new(),
            skipping: 0,
            tokens: 0,
        }
    }

    /// Consume the document and build the database.
    pub fn parse(mut self) -> DecodeResult<ParseOutcome> {
        loop {
            self.tokens = self.tokens.wrapping_add(1);
            if self.tokens % POLL_INTERVAL == 0 {
                if self.cancel.is_cancelled() {
                    return Err(DecodeError::Cancelled);
                }
                if !self.logger.set_progress(self.progress.percent()) {
                    return Ok(ParseOutcome::Stopped);
                }
            }

            match self.reader.next_event()? {
                XmlEvent::Start { name, attributes } => self.on_start(name, attributes)?,
                XmlEvent::Text(text) => self.on_text(text),
                XmlEvent::End { name } => self.on_end(&name)?,
                XmlEvent::Eof => break,
            }
        }

        if self.ctx != Ctx::Null {
            return Err(DecodeError::structural("document ended mid-context"));
        }
        let root = self
            .root_group
            .take()
            .ok_or_else(|| DecodeError::structural("document has no root group"))?;

        let mut db = self.db;
        let mut root = root;
        let subgroups = mem::take(&mut root.subgroups);
        let entries = mem::take(&mut root.entries);
        let root_id = db.replace_root(root.group);
        for entry in entries {
            db.add_entry(root_id, entry).map_err(duplicate_identity)?;
        }
        for sub in subgroups {
            attach_group(&mut db, root_id, sub)?;
        }
        Ok(ParseOutcome::Complete(db))
    }

    fn skip(&mut self) {
        self.skipping = 1;
    }

    fn capture_leaf(&mut self, name: String, attributes: Vec<(String, String)>) {
        self.text.clear();
        self.capture = Some(Capture { name, attributes });
    }

    fn on_text(&mut self, text: String) {
        if self.skipping > 0 {
            return;
        }
        if self.capture.is_some() {
            self.text.push_str(&text);
        } else {
            tracing::warn!(context = ?self.ctx, "ignoring text outside a value element");
        }
    }

    fn on_start(
        &mut self,
        name: String,
        attributes: Vec<(String, String)>,
    ) -> DecodeResult<()> {
        if self.skipping > 0 {
            self.skipping += 1;
            return Ok(());
        }
        if let Some(open) = &self.capture {
            return Err(DecodeError::structural(format!(
                "value element <{}> contains child <{}>",
                open.name, name
            )));
        }

        match self.ctx {
            Ctx::Null => {
                if name == el::DOCUMENT {
                    self.ctx = Ctx::Document;
                } else {
                    return Err(DecodeError::structural(format!(
                        "unexpected root element <{}>",
                        name
                    )));
                }
            }
            Ctx::Document => match name.as_str() {
                el::META => self.ctx = Ctx::Meta,
                el::ROOT => self.ctx = Ctx::Root,
                _ => self.skip(),
            },
            Ctx::Meta => match name.as_str() {
                el::MEMORY_PROTECTION => self.ctx = Ctx::MemoryProtection,
                el::CUSTOM_ICONS => self.ctx = Ctx::CustomIcons,
                el::BINARIES => self.ctx = Ctx::Binaries,
                el::CUSTOM_DATA => self.ctx = Ctx::CustomData,
                el::GENERATOR
                | el::HEADER_HASH
                | el::DB_NAME
                | el::DB_NAME_CHANGED
                | el::DB_DESC
                | el::DB_DESC_CHANGED
                | el::DEFAULT_USER
                | el::DEFAULT_USER_CHANGED
                | el::MAINTENANCE_DAYS
                | el::COLOR
                | el::MASTER_KEY_CHANGED
                | el::MASTER_KEY_CHANGE_REC
                | el::MASTER_KEY_CHANGE_FORCE
                | el::RECYCLE_BIN_ENABLED
                | el::RECYCLE_BIN_UUID
                | el::RECYCLE_BIN_CHANGED
                | el::ENTRY_TEMPLATES
                | el::ENTRY_TEMPLATES_CHANGED
                | el::HISTORY_MAX_ITEMS
                | el::HISTORY_MAX_SIZE
                | el::LAST_SELECTED_GROUP
                | el::LAST_TOP_VISIBLE_GROUP => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::MemoryProtection => match name.as_str() {
                el::PROTECT_TITLE
                | el::PROTECT_USERNAME
                | el::PROTECT_PASSWORD
                | el::PROTECT_URL
                | el::PROTECT_NOTES => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::CustomIcons => {
                if name == el::ICON {
                    self.icon_uuid = ObjectId::NIL;
                    self.icon_data.clear();
                    self.ctx = Ctx::CustomIcon;
                } else {
                    self.skip();
                }
            }
            Ctx::CustomIcon => match name.as_str() {
                el::UUID | el::DATA => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::Binaries => {
                if name == el::BINARY {
                    self.capture_leaf(name, attributes);
                } else {
                    self.skip();
                }
            }
            Ctx::CustomData => {
                if name == el::ITEM {
                    self.custom_key = None;
                    self.custom_value = None;
                    self.ctx = Ctx::CustomDataItem;
                } else {
                    self.skip();
                }
            }
            Ctx::CustomDataItem => match name.as_str() {
                el::KEY | el::VALUE => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::Root => match name.as_str() {
                el::GROUP => {
                    self.groups.push(PendingGroup::new());
                    self.ctx = Ctx::Group;
                }
                el::DELETED_OBJECTS => self.ctx = Ctx::DeletedObjects,
                _ => self.skip(),
            },
            Ctx::Group => match name.as_str() {
                el::GROUP => self.groups.push(PendingGroup::new()),
                el::ENTRY => {
                    self.entry = Some(Entry::with_uuid(ObjectId::NIL));
                    self.ctx = Ctx::Entry;
                }
                el::TIMES => self.ctx = Ctx::GroupTimes,
                el::UUID
                | el::NAME
                | el::NOTES
                | el::ICON_ID
                | el::CUSTOM_ICON_UUID
                | el::IS_EXPANDED
                | el::DEFAULT_AUTOTYPE_SEQUENCE
                | el::ENABLE_AUTOTYPE
                | el::ENABLE_SEARCHING
                | el::LAST_TOP_VISIBLE_ENTRY => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::GroupTimes | Ctx::EntryTimes => match name.as_str() {
                el::CREATION_TIME
                | el::LAST_MOD_TIME
                | el::LAST_ACCESS_TIME
                | el::EXPIRY_TIME
                | el::EXPIRES
                | el::USAGE_COUNT
                | el::LOCATION_CHANGED => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::Entry => match name.as_str() {
                el::TIMES => self.ctx = Ctx::EntryTimes,
                el::STRING => {
                    self.string_key = None;
                    self.string_value = None;
                    self.ctx = Ctx::EntryString;
                }
                el::BINARY => {
                    self.binary_key = None;
                    self.binary_value = None;
                    self.ctx = Ctx::EntryBinary;
                }
                el::AUTO_TYPE => self.ctx = Ctx::EntryAutoType,
                el::HISTORY => {
                    if self.parked_entry.is_some() {
                        return Err(DecodeError::structural(
                            "history inside a history snapshot",
                        ));
                    }
                    self.parked_entry = self.entry.take();
                    self.ctx = Ctx::EntryHistory;
                }
                el::UUID
                | el::ICON_ID
                | el::CUSTOM_ICON_UUID
                | el::FOREGROUND_COLOR
                | el::BACKGROUND_COLOR
                | el::OVERRIDE_URL
                | el::TAGS => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::EntryString => match name.as_str() {
                el::KEY | el::VALUE => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::EntryBinary => match name.as_str() {
                el::KEY | el::VALUE => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::EntryAutoType => match name.as_str() {
                el::AUTO_TYPE_ENABLED | el::AUTO_TYPE_OBFUSCATION | el::AUTO_TYPE_DEFAULT_SEQ => {
                    self.capture_leaf(name, attributes)
                }
                el::ASSOCIATION => {
                    self.assoc_window = None;
                    self.assoc_sequence = None;
                    self.ctx = Ctx::EntryAutoTypeItem;
                }
                _ => self.skip(),
            },
            Ctx::EntryAutoTypeItem => match name.as_str() {
                el::WINDOW | el::KEYSTROKE_SEQUENCE => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
            Ctx::EntryHistory => {
                if name == el::ENTRY {
                    self.entry = Some(Entry::with_uuid(ObjectId::NIL));
                    self.ctx = Ctx::Entry;
                } else {
                    self.skip();
                }
            }
            Ctx::DeletedObjects => {
                if name == el::DELETED_OBJECT {
                    self.deleted_uuid = ObjectId::NIL;
                    self.deleted_time = epoch();
                    self.ctx = Ctx::DeletedObject;
                } else {
                    self.skip();
                }
            }
            Ctx::DeletedObject => match name.as_str() {
                el::UUID | el::DELETION_TIME => self.capture_leaf(name, attributes),
                _ => self.skip(),
            },
        }
        Ok(())
    }

    fn on_end(&mut self, name: &str) -> DecodeResult<()> {
        if self.skipping > 0 {
            self.skipping -= 1;
            return Ok(());
        }
        if let Some(capture) = self.capture.take() {
            debug_assert_eq!(capture.name, name, "tokenizer guarantees balance");
            let text = mem::take(&mut self.text);
            return self.commit_leaf(capture, text);
        }

        self.ctx = match self.ctx {
            Ctx::Document => Ctx::Null,
            Ctx::Meta => Ctx::Document,
            Ctx::MemoryProtection => Ctx::Meta,
            Ctx::CustomIcons => Ctx::Meta,
            Ctx::CustomIcon => {
                self.commit_icon();
                Ctx::CustomIcons
            }
            Ctx::Binaries => Ctx::Meta,
            Ctx::CustomData => Ctx::Meta,
            Ctx::CustomDataItem => {
                if let Some(key) = self.custom_key.take() {
                    let value = self.custom_value.take().unwrap_or_default();
                    self.db.meta.custom_data.insert(key, value);
                }
                Ctx::CustomData
            }
            Ctx::Root => Ctx::Document,
            Ctx::Group => self.commit_group()?,
            Ctx::GroupTimes => Ctx::Group,
            Ctx::Entry => self.commit_entry()?,
            Ctx::EntryTimes => Ctx::Entry,
            Ctx::EntryString => {
                let key = self.string_key.take().unwrap_or_default();
                let value = self.string_value.take().unwrap_or_default();
                self.current_entry()?.fields.insert(key, value);
                Ctx::Entry
            }
            Ctx::EntryBinary => {
                let key = self.binary_key.take().unwrap_or_default();
                let value = self.binary_value.take().unwrap_or_default();
                self.current_entry()?.binaries.insert(key, value);
                Ctx::Entry
            }
            Ctx::EntryAutoType => Ctx::Entry,
            Ctx::EntryAutoTypeItem => {
                let window = self.assoc_window.take().unwrap_or_default();
                let sequence = self.assoc_sequence.take().unwrap_or_default();
                self.current_entry()?.auto_type.add(window, sequence);
                Ctx::EntryAutoType
            }
            Ctx::EntryHistory => {
                self.entry = Some(self.parked_entry.take().ok_or_else(|| {
                    DecodeError::structural("history closed without a parked entry")
                })?);
                Ctx::Entry
            }
            Ctx::DeletedObjects => Ctx::Root,
            Ctx::DeletedObject => {
                if self.deleted_uuid.is_nil() {
                    tracing::warn!("deleted object without identity, dropping");
                } else {
                    self.db.deleted_objects.push(DeletedObject {
                        uuid: self.deleted_uuid,
                        deletion_time: self.deleted_time,
                    });
                }
                Ctx::DeletedObjects
            }
            Ctx::Null => {
                return Err(DecodeError::structural(format!(
                    "close tag </{}> outside the document",
                    name
                )))
            }
        };
        Ok(())
    }

    fn commit_group(&mut self) -> DecodeResult<Ctx> {
        let mut pending = self
            .groups
            .pop()
            .ok_or_else(|| DecodeError::structural("group close without an open group"))?;
        if pending.group.uuid.is_nil() {
            pending.group.uuid = ObjectId::new_random();
        }
        if self.groups.is_empty() {
            if self.root_group.is_some() {
                return Err(DecodeError::structural("multiple root groups"));
            }
            self.root_group = Some(pending);
            Ok(Ctx::Root)
        } else {
            self.groups
                .last_mut()
                .expect("checked non-empty")
                .subgroups
                .push(pending);
            Ok(Ctx::Group)
        }
    }

    fn commit_entry(&mut self) -> DecodeResult<Ctx> {
        let mut entry = self
            .entry
            .take()
            .ok_or_else(|| DecodeError::structural("entry close without an open entry"))?;
        if let Some(parked) = self.parked_entry.as_mut() {
            // A history snapshot; identity is normalized at final commit.
            parked.history.push(entry);
            return Ok(Ctx::EntryHistory);
        }
        if entry.uuid.is_nil() {
            entry.uuid = ObjectId::new_random();
        }
        let uuid = entry.uuid;
        for snapshot in &mut entry.history {
            snapshot.uuid = uuid;
        }
        self.groups
            .last_mut()
            .ok_or_else(|| DecodeError::structural("entry outside a group"))?
            .entries
            .push(entry);
        Ok(Ctx::Group)
    }

    fn commit_icon(&mut self) {
        if self.icon_uuid.is_nil() {
            tracing::warn!("custom icon without identity, dropping");
            return;
        }
        self.db.custom_icons.push(CustomIcon {
            uuid: self.icon_uuid,
            data: mem::take(&mut self.icon_data),
        });
    }

    fn current_entry(&mut self) -> DecodeResult<&mut Entry> {
        self.entry
            .as_mut()
            .ok_or_else(|| DecodeError::structural("entry field outside an entry"))
    }

    fn current_group(&mut self) -> DecodeResult<&mut Group> {
        self.groups
            .last_mut()
            .map(|p| &mut p.group)
            .ok_or_else(|| DecodeError::structural("group field outside a group"))
    }

    /// Decode a string value, unmasking it when the protected attribute is
    /// set. Must be called in document order.
    fn decode_string_value(
        &mut self,
        attributes: &[(String, String)],
        text: String,
    ) -> DecodeResult<ProtectedString> {
        if attr_bool(attributes, el::ATTR_PROTECTED) {
            let mut bytes = decode_base64(&text, "protected value")?;
            self.random.apply(&mut bytes);
            let value = String::from_utf8(bytes).map_err(|_| {
                DecodeError::structural("protected value is not valid UTF-8 after unmasking")
            })?;
            Ok(ProtectedString::protected(value))
        } else {
            let protect = attr_bool(attributes, el::ATTR_PROTECT_IN_MEMORY);
            Ok(ProtectedString::new(text, protect))
        }
    }

    /// Decode a binary value: a pool reference, or inline base64 that may
    /// be stream-masked and/or compressed.
    fn decode_binary_value(
        &mut self,
        attributes: &[(String, String)],
        text: String,
    ) -> DecodeResult<ProtectedBinary> {
        if let Some(reference) = attr(attributes, el::ATTR_REF) {
            return self
                .binary_pool
                .get(reference)
                .cloned()
                .ok_or_else(|| {
                    DecodeError::structural(format!("unresolved binary reference {}", reference))
                });
        }
        let protected = attr_bool(attributes, el::ATTR_PROTECTED);
        let mut bytes = decode_base64(&text, "binary value")?;
        if protected {
            self.random.apply(&mut bytes);
        }
        if attr_bool(attributes, el::ATTR_COMPRESSED) {
            bytes = gunzip(&bytes)?;
        }
        let protect = protected || attr_bool(attributes, el::ATTR_PROTECT_IN_MEMORY);
        Ok(ProtectedBinary::new(bytes, protect))
    }

    fn commit_leaf(&mut self, capture: Capture, text: String) -> DecodeResult<()> {
        let name = capture.name.as_str();
        match self.ctx {
            Ctx::Meta => {
                let meta = &mut self.db.meta;
                match name {
                    el::GENERATOR => meta.generator = text,
                    el::HEADER_HASH => {
                        let embedded = decode_base64(&text, "header hash")?;
                        if embedded != self.header_hash {
                            return Err(DecodeError::structural(
                                "embedded header hash does not match the file header",
                            ));
                        }
                    }
                    el::DB_NAME => meta.name = text,
                    el::DB_NAME_CHANGED => meta.name_changed = parse_kdbx(&text),
                    el::DB_DESC => meta.description = text,
                    el::DB_DESC_CHANGED => meta.description_changed = parse_kdbx(&text),
                    el::DEFAULT_USER => meta.default_username = text,
                    el::DEFAULT_USER_CHANGED => {
                        meta.default_username_changed = parse_kdbx(&text)
                    }
                    el::MAINTENANCE_DAYS => {
                        meta.maintenance_history_days =
                            parse_number(&text, meta.maintenance_history_days)
                    }
                    el::COLOR => meta.color = text,
                    el::MASTER_KEY_CHANGED => meta.master_key_changed = parse_kdbx(&text),
                    el::MASTER_KEY_CHANGE_REC => {
                        meta.master_key_change_rec = parse_number(&text, -1)
                    }
                    el::MASTER_KEY_CHANGE_FORCE => {
                        meta.master_key_change_force = parse_number(&text, -1)
                    }
                    el::RECYCLE_BIN_ENABLED => {
                        meta.recycle_bin_enabled = parse_bool(&text, true)
                    }
                    el::RECYCLE_BIN_UUID => meta.recycle_bin = decode_uuid(&text)?,
                    el::RECYCLE_BIN_CHANGED => meta.recycle_bin_changed = parse_kdbx(&text),
                    el::ENTRY_TEMPLATES => meta.entry_templates_group = decode_uuid(&text)?,
                    el::ENTRY_TEMPLATES_CHANGED => {
                        meta.entry_templates_group_changed = parse_kdbx(&text)
                    }
                    el::HISTORY_MAX_ITEMS => {
                        meta.history.max_items = parse_number(&text, meta.history.max_items)
                    }
                    el::HISTORY_MAX_SIZE => {
                        meta.history.max_size = parse_number(&text, meta.history.max_size)
                    }
                    el::LAST_SELECTED_GROUP => meta.last_selected_group = decode_uuid(&text)?,
                    el::LAST_TOP_VISIBLE_GROUP => {
                        meta.last_top_visible_group = decode_uuid(&text)?
                    }
                    _ => unreachable!("captured unknown meta leaf {}", name),
                }
            }
            Ctx::MemoryProtection => {
                let mp = &mut self.db.meta.memory_protection;
                match name {
                    el::PROTECT_TITLE => mp.protect_title = parse_bool(&text, false),
                    el::PROTECT_USERNAME => mp.protect_username = parse_bool(&text, false),
                    el::PROTECT_PASSWORD => mp.protect_password = parse_bool(&text, true),
                    el::PROTECT_URL => mp.protect_url = parse_bool(&text, false),
                    el::PROTECT_NOTES => mp.protect_notes = parse_bool(&text, false),
                    _ => unreachable!(),
                }
            }
            Ctx::CustomIcon => match name {
                el::UUID => self.icon_uuid = decode_uuid(&text)?,
                el::DATA => self.icon_data = decode_base64(&text, "icon data")?,
                _ => unreachable!(),
            },
            Ctx::Binaries => {
                let id = attr(&capture.attributes, el::ATTR_ID)
                    .ok_or_else(|| DecodeError::structural("pool binary without ID"))?
                    .to_string();
                let value = self.decode_binary_value(&capture.attributes, text)?;
                self.binary_pool.insert(id, value);
            }
            Ctx::CustomDataItem => match name {
                el::KEY => self.custom_key = Some(text),
                el::VALUE => self.custom_value = Some(text),
                _ => unreachable!(),
            },
            Ctx::Group => {
                let group = self.current_group()?;
                match name {
                    el::UUID => group.uuid = decode_uuid(&text)?,
                    el::NAME => group.name = text,
                    el::NOTES => group.notes = text,
                    el::ICON_ID => group.icon_id = parse_number(&text, group.icon_id),
                    el::CUSTOM_ICON_UUID => group.custom_icon = decode_uuid(&text)?,
                    el::IS_EXPANDED => group.is_expanded = parse_bool(&text, true),
                    el::DEFAULT_AUTOTYPE_SEQUENCE => group.default_autotype_sequence = text,
                    el::ENABLE_AUTOTYPE => {
                        group.enable_autotype = Inheritable::from_kdbx(&text)
                    }
                    el::ENABLE_SEARCHING => {
                        group.enable_searching = Inheritable::from_kdbx(&text)
                    }
                    el::LAST_TOP_VISIBLE_ENTRY => {
                        group.last_top_visible_entry = decode_uuid(&text)?
                    }
                    _ => unreachable!(),
                }
            }
            Ctx::GroupTimes => {
                let times = &mut self.current_group()?.times;
                apply_time_leaf(times, name, &text);
            }
            Ctx::EntryTimes => {
                let times = &mut self.current_entry()?.times;
                apply_time_leaf(times, name, &text);
            }
            Ctx::Entry => {
                let entry = self.current_entry()?;
                match name {
                    el::UUID => entry.uuid = decode_uuid(&text)?,
                    el::ICON_ID => entry.icon_id = parse_number(&text, entry.icon_id),
                    el::CUSTOM_ICON_UUID => entry.custom_icon = decode_uuid(&text)?,
                    el::FOREGROUND_COLOR => entry.foreground_color = text,
                    el::BACKGROUND_COLOR => entry.background_color = text,
                    el::OVERRIDE_URL => entry.override_url = text,
                    el::TAGS => entry.tags = parse_tags(&text),
                    _ => unreachable!(),
                }
            }
            Ctx::EntryString => match name {
                el::KEY => self.string_key = Some(text),
                el::VALUE => {
                    self.string_value = Some(self.decode_string_value(&capture.attributes, text)?)
                }
                _ => unreachable!(),
            },
            Ctx::EntryBinary => match name {
                el::KEY => self.binary_key = Some(text),
                el::VALUE => {
                    self.binary_value = Some(self.decode_binary_value(&capture.attributes, text)?)
                }
                _ => unreachable!(),
            },
            Ctx::EntryAutoType => {
                let entry = self.current_entry()?;
                match name {
                    el::AUTO_TYPE_ENABLED => {
                        entry.auto_type.enabled = parse_bool(&text, true)
                    }
                    el::AUTO_TYPE_OBFUSCATION => {
                        entry.auto_type.obfuscation =
                            parse_number(&text, entry.auto_type.obfuscation)
                    }
                    el::AUTO_TYPE_DEFAULT_SEQ => entry.auto_type.default_sequence = text,
                    _ => unreachable!(),
                }
            }
            Ctx::EntryAutoTypeItem => match name {
                el::WINDOW => self.assoc_window = Some(text),
                el::KEYSTROKE_SEQUENCE => self.assoc_sequence = Some(text),
                _ => unreachable!(),
            },
            Ctx::DeletedObject => match name {
                el::UUID => self.deleted_uuid = decode_uuid(&text)?,
                el::DELETION_TIME => self.deleted_time = parse_kdbx(&text),
                _ => unreachable!(),
            },
            _ => {
                return Err(DecodeError::structural(format!(
                    "value element <{}> in unexpected context",
                    name
                )))
            }
        }
        Ok(())
    }
}

fn attach_group(
    db: &mut Database,
    parent: ObjectId,
    pending: PendingGroup,
) -> DecodeResult<ObjectId> {
    let gid = db
        .add_group(parent, pending.group)
        .map_err(duplicate_identity)?;
    for entry in pending.entries {
        db.add_entry(gid, entry).map_err(duplicate_identity)?;
    }
    for sub in pending.subgroups {
        attach_group(db, gid, sub)?;
    }
    Ok(gid)
}

fn duplicate_identity(err: vaultsync_core::MergeError) -> DecodeError {
    DecodeError::structural(format!("identity conflict in document: {}", err))
}

fn attr<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn attr_bool(attributes: &[(String, String)], name: &str) -> bool {
    attr(attributes, name).map(|v| parse_bool(v, false)).unwrap_or(false)
}

fn parse_bool(text: &str, default: bool) -> bool {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => true,
        "false" => false,
        _ => default,
    }
}

fn parse_number<T: std::str::FromStr + Copy>(text: &str, default: T) -> T {
    match text.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(value = text, "unparseable number, keeping default");
            default
        }
    }
}

fn parse_tags(text: &str) -> Vec<String> {
    text.split([',', ';'])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn decode_base64(text: &str, what: &str) -> DecodeResult<Vec<u8>> {
    BASE64
        .decode(text.trim())
        .map_err(|_| DecodeError::structural(format!("invalid base64 in {}", what)))
}

/// Decode a base64 identity; empty text is the nil sentinel.
fn decode_uuid(text: &str) -> DecodeResult<ObjectId> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(ObjectId::NIL);
    }
    let bytes = decode_base64(trimmed, "identity")?;
    ObjectId::from_slice(&bytes)
        .ok_or_else(|| DecodeError::structural(format!("identity is {} bytes", bytes.len())))
}

fn apply_time_leaf(times: &mut vaultsync_model::TimeInfo, name: &str, text: &str) {
    match name {
        el::CREATION_TIME => times.creation = parse_kdbx(text),
        el::LAST_MOD_TIME => times.last_modification = parse_kdbx(text),
        el::LAST_ACCESS_TIME => times.last_access = parse_kdbx(text),
        el::EXPIRY_TIME => times.expiry = parse_kdbx(text),
        el::EXPIRES => times.expires = parse_bool(text, false),
        el::USAGE_COUNT => times.usage_count = parse_number(text, times.usage_count),
        el::LOCATION_CHANGED => times.location_changed = parse_kdbx(text),
        _ => unreachable!("captured unknown time leaf {}", name),
    }
}

fn gunzip(bytes: &[u8]) -> DecodeResult<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(bytes)
        .read_to_end(&mut out)
        .map_err(|_| DecodeError::structural("corrupt compressed binary"))?;
    Ok(out)
}
