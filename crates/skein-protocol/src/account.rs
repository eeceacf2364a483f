use serde::{Deserialize, Serialize};

use crate::ContextId;

/// Account summary as returned by `get_all_accounts` / `get_account_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Account {
    #[serde(rename_all = "camelCase")]
    Configured {
        id: u32,
        display_name: Option<String>,
        addr: Option<String>,
        profile_image: Option<String>,
        color: String,
    },
    Unconfigured {
        id: u32,
    },
}

impl Account {
    pub fn id(&self) -> u32 {
        match self {
            Self::Configured { id, .. } | Self::Unconfigured { id } => *id,
        }
    }

    /// The context id under which this account's events arrive.
    pub fn context_id(&self) -> ContextId {
        ContextId(self.id())
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured { .. })
    }
}
