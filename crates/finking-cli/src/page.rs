//! Top-level pages of the client.
//!
//! Only the chatbot page hosts the chat core; leaving it tears the core down.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    Home,
    Chatbot,
    Uploads,
    Services,
    Profile,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown page '{0}' (expected one of: home, chatbot, uploads, services, profile)")]
pub struct UnknownPage(pub String);

impl Page {
    pub const ALL: [Page; 5] = [
        Page::Home,
        Page::Chatbot,
        Page::Uploads,
        Page::Services,
        Page::Profile,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Page::Home => "home",
            Page::Chatbot => "chatbot",
            Page::Uploads => "uploads",
            Page::Services => "services",
            Page::Profile => "profile",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Page::Home => "Home",
            Page::Chatbot => "Chatbot",
            Page::Uploads => "Uploads",
            Page::Services => "Services",
            Page::Profile => "Profile",
        }
    }

    pub fn hosts_chat(self) -> bool {
        matches!(self, Page::Chatbot)
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Page {
    type Err = UnknownPage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Page::ALL
            .into_iter()
            .find(|page| page.name() == wanted)
            .ok_or_else(|| UnknownPage(s.trim().to_string()))
    }
}
