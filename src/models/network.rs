// Network interface model

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceStat {
    pub iface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip4: Option<String>,
    pub mac: String,
    pub internal: bool,
}
