//! Canonical baseline items
//!
//! The five inventory categories are the only category-specific knowledge in
//! the whole comparison algorithm: each one maps to a canonical
//! (key, value, type) triple here, and everything downstream (snapshot
//! build, diff, hashing) is category-agnostic. An uploaded record missing
//! the fields its key needs is rejected as malformed, never guessed at.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Category;
use crate::models::inventory::NewInventoryItem;

/// The (key, value, type) triple a baseline snapshot stores per item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub key: String,
    pub value: String,
    pub item_type: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("record is not a JSON object")]
    NotAnObject,
}

/// One parsed inventory record, tagged by category.
#[derive(Debug, Clone, PartialEq)]
pub enum InventoryRecord {
    Process {
        pid: i64,
        name: String,
        cpu_percent: Option<f64>,
        memory_percent: Option<f64>,
    },
    Port {
        port: i64,
        protocol: String,
        status: Option<String>,
        process_name: Option<String>,
    },
    Usb {
        device_name: Option<String>,
        device_type: Option<String>,
        manufacturer: Option<String>,
        serial_number: Option<String>,
        vendor_id: Option<String>,
        product_id: Option<String>,
    },
    Login {
        username: String,
        login_type: Option<String>,
        login_ip: Option<String>,
    },
    Software {
        name: String,
        version: Option<String>,
        publisher: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawProcess {
    pid: Option<i64>,
    name: Option<String>,
    cpu_percent: Option<f64>,
    memory_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawPort {
    port: Option<i64>,
    protocol: Option<String>,
    status: Option<String>,
    process_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUsb {
    device_name: Option<String>,
    device_type: Option<String>,
    manufacturer: Option<String>,
    serial_number: Option<String>,
    vendor_id: Option<String>,
    product_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLogin {
    username: Option<String>,
    login_type: Option<String>,
    login_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSoftware {
    #[serde(alias = "name")]
    software_name: Option<String>,
    version: Option<String>,
    publisher: Option<String>,
}

impl InventoryRecord {
    /// Parse one uploaded record for a category. Extra fields are ignored;
    /// absent key fields are an error, not a default.
    pub fn parse(category: Category, raw: &serde_json::Value) -> Result<InventoryRecord, ItemError> {
        if !raw.is_object() {
            return Err(ItemError::NotAnObject);
        }

        match category {
            Category::Process => {
                let p: RawProcess = deserialize(raw)?;
                Ok(InventoryRecord::Process {
                    pid: p.pid.ok_or(ItemError::MissingField("pid"))?,
                    name: non_empty(p.name).ok_or(ItemError::MissingField("name"))?,
                    cpu_percent: p.cpu_percent,
                    memory_percent: p.memory_percent,
                })
            }
            Category::Port => {
                let p: RawPort = deserialize(raw)?;
                Ok(InventoryRecord::Port {
                    port: p.port.ok_or(ItemError::MissingField("port"))?,
                    protocol: non_empty(p.protocol).ok_or(ItemError::MissingField("protocol"))?,
                    status: p.status,
                    process_name: p.process_name,
                })
            }
            Category::Usb => {
                let u: RawUsb = deserialize(raw)?;
                let record = InventoryRecord::Usb {
                    device_name: non_empty(u.device_name),
                    device_type: u.device_type,
                    manufacturer: u.manufacturer,
                    serial_number: non_empty(u.serial_number),
                    vendor_id: non_empty(u.vendor_id),
                    product_id: non_empty(u.product_id),
                };
                // at least one key source must be present
                if record.usb_key().is_none() {
                    return Err(ItemError::MissingField("serial_number"));
                }
                Ok(record)
            }
            Category::Login => {
                let l: RawLogin = deserialize(raw)?;
                Ok(InventoryRecord::Login {
                    username: non_empty(l.username).ok_or(ItemError::MissingField("username"))?,
                    login_type: l.login_type,
                    login_ip: l.login_ip,
                })
            }
            Category::Software => {
                let s: RawSoftware = deserialize(raw)?;
                Ok(InventoryRecord::Software {
                    name: non_empty(s.software_name)
                        .ok_or(ItemError::MissingField("software_name"))?,
                    version: s.version,
                    publisher: s.publisher,
                })
            }
        }
    }

    pub fn category(&self) -> Category {
        match self {
            InventoryRecord::Process { .. } => Category::Process,
            InventoryRecord::Port { .. } => Category::Port,
            InventoryRecord::Usb { .. } => Category::Usb,
            InventoryRecord::Login { .. } => Category::Login,
            InventoryRecord::Software { .. } => Category::Software,
        }
    }

    /// Stable identifier, unique within the category's key space.
    pub fn item_key(&self) -> String {
        match self {
            InventoryRecord::Process { pid, name, .. } => format!("{}:{}", pid, name),
            InventoryRecord::Port { port, protocol, .. } => format!("{}:{}", port, protocol),
            InventoryRecord::Usb { .. } => self.usb_key().unwrap_or_default(),
            InventoryRecord::Login { username, login_type, .. } => match login_type {
                Some(t) => format!("{}:{}", username, t),
                None => username.clone(),
            },
            InventoryRecord::Software { name, .. } => name.clone(),
        }
    }

    /// Serialized representative state; compared byte-for-byte by the diff.
    pub fn item_value(&self) -> String {
        match self {
            InventoryRecord::Process { pid, name, cpu_percent, memory_percent } => format!(
                "{}|{}|{}|{}",
                name,
                pid,
                fmt_opt_f64(cpu_percent),
                fmt_opt_f64(memory_percent)
            ),
            InventoryRecord::Port { port, protocol, status, process_name } => format!(
                "{}|{}|{}|{}",
                port,
                protocol,
                opt_str(status),
                opt_str(process_name)
            ),
            InventoryRecord::Usb {
                device_name,
                device_type,
                manufacturer,
                serial_number,
                ..
            } => format!(
                "{}|{}|{}|{}",
                opt_str(device_name),
                opt_str(device_type),
                opt_str(manufacturer),
                opt_str(serial_number)
            ),
            InventoryRecord::Login { username, login_type, login_ip } => {
                format!("{}|{}|{}", username, opt_str(login_type), opt_str(login_ip))
            }
            InventoryRecord::Software { name, version, publisher } => {
                format!("{}|{}|{}", name, opt_str(version), opt_str(publisher))
            }
        }
    }

    /// Grouping key for the frequency engine: process name, port:protocol,
    /// or the item key for categories without frequency analysis.
    pub fn entity_key(&self) -> String {
        match self {
            InventoryRecord::Process { name, .. } => name.clone(),
            InventoryRecord::Port { port, protocol, .. } => format!("{}:{}", port, protocol),
            _ => self.item_key(),
        }
    }

    pub fn canonical(&self) -> CanonicalItem {
        CanonicalItem {
            key: self.item_key(),
            value: self.item_value(),
            item_type: self.category().item_type().to_string(),
        }
    }

    pub fn to_new_item(&self) -> NewInventoryItem {
        let (cpu, mem) = match self {
            InventoryRecord::Process { cpu_percent, memory_percent, .. } => {
                (*cpu_percent, *memory_percent)
            }
            _ => (None, None),
        };
        NewInventoryItem {
            item_key: self.item_key(),
            entity_key: self.entity_key(),
            item_value: self.item_value(),
            cpu_percent: cpu,
            memory_percent: mem,
        }
    }

    /// USB key fallback chain: serial number, then vendor:product, then
    /// device name.
    fn usb_key(&self) -> Option<String> {
        match self {
            InventoryRecord::Usb { serial_number, vendor_id, product_id, device_name, .. } => {
                if let Some(serial) = serial_number {
                    return Some(serial.clone());
                }
                if let (Some(vid), Some(pid)) = (vendor_id, product_id) {
                    return Some(format!("{}:{}", vid, pid));
                }
                device_name.clone()
            }
            _ => None,
        }
    }
}

fn deserialize<'a, T: Deserialize<'a>>(raw: &'a serde_json::Value) -> Result<T, ItemError> {
    T::deserialize(raw).map_err(|_| ItemError::NotAnObject)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn opt_str(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn fmt_opt_f64(value: &Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ===== Hashing =====

/// Lowercase hex SHA-256
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Digest of one item: SHA-256(key ++ value)
pub fn item_hash(item: &CanonicalItem) -> String {
    sha256_hex(&format!("{}{}", item.key, item.value))
}

/// Digest of a whole snapshot. Items are sorted by key first so two
/// snapshots with the same content hash identically regardless of the order
/// the source rows arrived in.
pub fn snapshot_hash(items: &[CanonicalItem]) -> String {
    let mut sorted: Vec<&CanonicalItem> = items.iter().collect();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));

    let mut content = String::new();
    for item in sorted {
        content.push_str(&item.key);
        content.push_str(&item.value);
    }
    sha256_hex(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn process_maps_to_pid_name_key() {
        let record = InventoryRecord::parse(
            Category::Process,
            &json!({"pid": 1234, "name": "nginx", "cpu_percent": 1.5, "memory_percent": 0.8}),
        )
        .unwrap();
        assert_eq!(record.item_key(), "1234:nginx");
        assert_eq!(record.item_value(), "nginx|1234|1.5|0.8");
        assert_eq!(record.entity_key(), "nginx");
        assert_eq!(record.canonical().item_type, "process");
    }

    #[test]
    fn process_without_pid_is_malformed() {
        let err = InventoryRecord::parse(Category::Process, &json!({"name": "nginx"})).unwrap_err();
        assert_eq!(err, ItemError::MissingField("pid"));
    }

    #[test]
    fn port_maps_to_port_protocol_key() {
        let record = InventoryRecord::parse(
            Category::Port,
            &json!({"port": 80, "protocol": "tcp", "status": "LISTEN", "process_name": "nginx"}),
        )
        .unwrap();
        assert_eq!(record.item_key(), "80:tcp");
        assert_eq!(record.item_value(), "80|tcp|LISTEN|nginx");
        assert_eq!(record.entity_key(), "80:tcp");
    }

    #[test]
    fn port_missing_protocol_is_malformed() {
        let err = InventoryRecord::parse(Category::Port, &json!({"port": 80})).unwrap_err();
        assert_eq!(err, ItemError::MissingField("protocol"));
    }

    #[test]
    fn usb_key_falls_back_from_serial_to_vid_pid_to_name() {
        let with_serial = InventoryRecord::parse(
            Category::Usb,
            &json!({"device_name": "Stick", "serial_number": "S123", "vendor_id": "0781", "product_id": "5567"}),
        )
        .unwrap();
        assert_eq!(with_serial.item_key(), "S123");

        let with_ids = InventoryRecord::parse(
            Category::Usb,
            &json!({"device_name": "Stick", "vendor_id": "0781", "product_id": "5567"}),
        )
        .unwrap();
        assert_eq!(with_ids.item_key(), "0781:5567");

        let name_only =
            InventoryRecord::parse(Category::Usb, &json!({"device_name": "Stick"})).unwrap();
        assert_eq!(name_only.item_key(), "Stick");

        let nothing = InventoryRecord::parse(Category::Usb, &json!({"device_type": "storage"}));
        assert!(nothing.is_err());
    }

    #[test]
    fn login_key_includes_type_when_present() {
        let with_type = InventoryRecord::parse(
            Category::Login,
            &json!({"username": "root", "login_type": "ssh", "login_ip": "10.0.0.5"}),
        )
        .unwrap();
        assert_eq!(with_type.item_key(), "root:ssh");
        assert_eq!(with_type.item_value(), "root|ssh|10.0.0.5");

        let without_type =
            InventoryRecord::parse(Category::Login, &json!({"username": "root"})).unwrap();
        assert_eq!(without_type.item_key(), "root");
    }

    #[test]
    fn software_keyed_by_name_so_version_change_is_modified() {
        let v1 = InventoryRecord::parse(
            Category::Software,
            &json!({"software_name": "curl", "version": "8.1", "publisher": "curl project"}),
        )
        .unwrap();
        let v2 = InventoryRecord::parse(
            Category::Software,
            &json!({"software_name": "curl", "version": "8.2", "publisher": "curl project"}),
        )
        .unwrap();
        assert_eq!(v1.item_key(), v2.item_key());
        assert_ne!(v1.item_value(), v2.item_value());
    }

    #[test]
    fn non_object_record_is_rejected() {
        let err = InventoryRecord::parse(Category::Process, &json!("nginx")).unwrap_err();
        assert_eq!(err, ItemError::NotAnObject);
    }

    #[test]
    fn item_hash_is_lowercase_hex_sha256() {
        let item = CanonicalItem {
            key: "80:tcp".to_string(),
            value: "80|tcp|LISTEN|nginx".to_string(),
            item_type: "port".to_string(),
        };
        let digest = item_hash(&item);
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(digest, sha256_hex("80:tcp80|tcp|LISTEN|nginx"));
    }

    #[test]
    fn snapshot_hash_is_order_independent() {
        let a = CanonicalItem {
            key: "a".to_string(),
            value: "1".to_string(),
            item_type: "port".to_string(),
        };
        let b = CanonicalItem {
            key: "b".to_string(),
            value: "2".to_string(),
            item_type: "port".to_string(),
        };
        assert_eq!(
            snapshot_hash(&[a.clone(), b.clone()]),
            snapshot_hash(&[b, a])
        );
    }

    #[test]
    fn snapshot_hash_changes_with_content() {
        let a = CanonicalItem {
            key: "a".to_string(),
            value: "1".to_string(),
            item_type: "port".to_string(),
        };
        let mut b = a.clone();
        b.value = "2".to_string();
        assert_ne!(snapshot_hash(&[a]), snapshot_hash(&[b]));
    }
}
