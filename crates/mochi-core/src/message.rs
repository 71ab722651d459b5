//! Platform-agnostic message model.
//!
//! Commands arrive as a [`MessageChain`]: text runs interleaved with opaque
//! rich elements (images, faces, mentions). The command core never interprets
//! rich elements beyond passing them to argument parsers.

use std::fmt;

/// A single element of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageElement {
    /// A run of plain text.
    Text(String),
    /// An image, identified by its server-side id (e.g. `{7AA4B3AA-...}.jpg`).
    Image { id: String },
    /// A built-in face/emoji by numeric id.
    Face { id: u8 },
    /// A mention of a user.
    At { target: u64, display: String },
    /// A rich XML card.
    Xml(String),
}

impl MessageElement {
    pub fn text(s: impl Into<String>) -> Self {
        MessageElement::Text(s.into())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, MessageElement::Text(_))
    }

    /// Textual fallback used by argument parsers that have no special case for
    /// this element. Images and XML cards have none.
    pub fn text_fallback(&self) -> Option<String> {
        match self {
            MessageElement::Text(s) => Some(s.clone()),
            MessageElement::At { target, .. } => Some(target.to_string()),
            MessageElement::Face { id } => Some(format!("[face{}.gif]", id)),
            MessageElement::Image { .. } | MessageElement::Xml(_) => None,
        }
    }

    /// Human-readable rendering, used for display and logging.
    pub fn content(&self) -> String {
        match self {
            MessageElement::Text(s) => s.clone(),
            MessageElement::Image { id } => format!("[image:{}]", id),
            MessageElement::Face { id } => format!("[face{}.gif]", id),
            MessageElement::At { display, target } if display.is_empty() => format!("@{}", target),
            MessageElement::At { display, .. } => format!("@{}", display),
            MessageElement::Xml(_) => "[xml]".to_string(),
        }
    }
}

impl fmt::Display for MessageElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content())
    }
}

impl From<&str> for MessageElement {
    fn from(s: &str) -> Self {
        MessageElement::Text(s.to_string())
    }
}

impl From<String> for MessageElement {
    fn from(s: String) -> Self {
        MessageElement::Text(s)
    }
}

/// An ordered sequence of message elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MessageChain(Vec<MessageElement>);

impl MessageChain {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, element: impl Into<MessageElement>) {
        self.0.push(element.into());
    }

    /// Builder-style push.
    pub fn with(mut self, element: impl Into<MessageElement>) -> Self {
        self.push(element);
        self
    }

    pub fn elements(&self) -> &[MessageElement] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MessageElement> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenated content of all elements.
    pub fn content(&self) -> String {
        self.0.iter().map(MessageElement::content).collect()
    }

    /// True if every element is text and the concatenated text is blank.
    pub fn is_blank(&self) -> bool {
        self.0.iter().all(|e| match e {
            MessageElement::Text(s) => s.trim().is_empty(),
            _ => false,
        })
    }
}

impl fmt::Display for MessageChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content())
    }
}

impl From<&str> for MessageChain {
    fn from(s: &str) -> Self {
        MessageChain(vec![MessageElement::text(s)])
    }
}

impl From<String> for MessageChain {
    fn from(s: String) -> Self {
        MessageChain(vec![MessageElement::Text(s)])
    }
}

impl From<Vec<MessageElement>> for MessageChain {
    fn from(elements: Vec<MessageElement>) -> Self {
        MessageChain(elements)
    }
}

impl FromIterator<MessageElement> for MessageChain {
    fn from_iter<I: IntoIterator<Item = MessageElement>>(iter: I) -> Self {
        MessageChain(iter.into_iter().collect())
    }
}

impl IntoIterator for MessageChain {
    type Item = MessageElement;
    type IntoIter = std::vec::IntoIter<MessageElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a MessageChain {
    type Item = &'a MessageElement;
    type IntoIter = std::slice::Iter<'a, MessageElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_fallback() {
        assert_eq!(MessageElement::text("hi").text_fallback().as_deref(), Some("hi"));
        assert_eq!(
            MessageElement::At {
                target: 123,
                display: "bob".into()
            }
            .text_fallback()
            .as_deref(),
            Some("123")
        );
        assert!(MessageElement::Image { id: "x".into() }.text_fallback().is_none());
    }

    #[test]
    fn test_chain_content_and_blank() {
        let chain = MessageChain::new()
            .with("a ")
            .with(MessageElement::Face { id: 12 })
            .with(" b");
        assert_eq!(chain.content(), "a [face12.gif] b");
        assert!(!chain.is_blank());
        assert!(MessageChain::from("   ").is_blank());
        assert!(MessageChain::new().is_blank());
    }
}
