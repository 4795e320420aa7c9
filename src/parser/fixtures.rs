//! Synthetic ULog files for unit tests

use crate::parser::stream::ULOG_MAGIC;

pub struct UlogBuilder {
    bytes: Vec<u8>,
}

impl UlogBuilder {
    pub fn new() -> Self {
        let mut bytes = ULOG_MAGIC.to_vec();
        bytes.push(1);
        bytes.extend_from_slice(&0u64.to_le_bytes());
        Self { bytes }
    }

    pub fn raw(&mut self, msg_type: u8, payload: &[u8]) -> &mut Self {
        self.bytes
            .extend_from_slice(&(payload.len() as u16).to_le_bytes());
        self.bytes.push(msg_type);
        self.bytes.extend_from_slice(payload);
        self
    }

    pub fn format(&mut self, definition: &str) -> &mut Self {
        self.raw(b'F', definition.as_bytes())
    }

    pub fn info_str(&mut self, key: &str, value: &str) -> &mut Self {
        let key = format!("char[{}] {}", value.len(), key);
        let mut payload = vec![key.len() as u8];
        payload.extend_from_slice(key.as_bytes());
        payload.extend_from_slice(value.as_bytes());
        self.raw(b'I', &payload)
    }

    pub fn subscribe(&mut self, multi_id: u8, msg_id: u16, name: &str) -> &mut Self {
        let mut payload = vec![multi_id];
        payload.extend_from_slice(&msg_id.to_le_bytes());
        payload.extend_from_slice(name.as_bytes());
        self.raw(b'A', &payload)
    }

    pub fn data(&mut self, msg_id: u16, body: &[u8]) -> &mut Self {
        let mut payload = msg_id.to_le_bytes().to_vec();
        payload.extend_from_slice(body);
        self.raw(b'D', &payload)
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}
