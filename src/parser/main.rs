use crate::error::{ConvertError, Result};
use crate::parser::decoder::*;
use crate::parser::header::{parse_field_spec, parse_format_definition};
use crate::parser::stream::{decode_text, MessageStream, PayloadStream, RawMessage};
use crate::types::{FieldValue, LogRecord, MessageFormat, ReaderStats, UlogHeader};
use log::{debug, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

#[derive(Debug, Clone)]
struct Subscription {
    message_name: String,
    multi_id: u8,
}

/// Streaming ULog reader
///
/// Yields one [`LogRecord`] per data message, in file order. Definitions
/// (formats, info, subscriptions) are absorbed as they are met. The reader
/// is a single forward pass: once it returns `None` or an error it stays
/// exhausted.
pub struct UlogReader<R> {
    stream: MessageStream<R>,
    header: UlogHeader,
    formats: HashMap<String, MessageFormat>,
    subscriptions: HashMap<u16, Subscription>,
    stats: ReaderStats,
    finished: bool,
}

/// Open a `.ulg` file for streaming
pub fn open_ulog_file(path: &Path) -> Result<UlogReader<BufReader<File>>> {
    let file = File::open(path).map_err(|source| ConvertError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    UlogReader::new(BufReader::new(file))
}

impl<R: Read> UlogReader<R> {
    /// Validate the file header; fails with `MalformedLog` on a magic mismatch
    pub fn new(reader: R) -> Result<Self> {
        let mut stream = MessageStream::new(reader);
        let (version, timestamp_us) = stream.read_file_header()?;
        if version > 1 {
            warn!("ULog version {} is newer than supported, reading anyway", version);
        }
        debug!("ULog v{} starting at {} us", version, timestamp_us);

        Ok(Self {
            stream,
            header: UlogHeader {
                version,
                timestamp_us,
                ..UlogHeader::default()
            },
            formats: HashMap::new(),
            subscriptions: HashMap::new(),
            stats: ReaderStats::default(),
            finished: false,
        })
    }

    pub fn header(&self) -> &UlogHeader {
        &self.header
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    pub fn format(&self, name: &str) -> Option<&MessageFormat> {
        self.formats.get(name)
    }

    fn next_record(&mut self) -> Result<Option<LogRecord>> {
        while let Some(message) = self.stream.next_message()? {
            self.stats.messages += 1;
            if let Some(record) = self.handle_message(&message)? {
                self.stats.data_records += 1;
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    fn handle_message(&mut self, message: &RawMessage) -> Result<Option<LogRecord>> {
        let mut payload = PayloadStream::new(&message.payload);

        match message.msg_type {
            MSG_DATA => return self.decode_data(&mut payload, message.offset),
            MSG_FORMAT => {
                let format = parse_format_definition(&decode_text(&message.payload))?;
                debug!("Format '{}' with {} fields", format.name, format.fields.len());
                self.formats.insert(format.name.clone(), format);
            }
            MSG_ADD_LOGGED => {
                let multi_id = payload.read_byte()?;
                let msg_id = payload.read_u16()?;
                let message_name = payload.read_rest_str();
                debug!(
                    "Subscription {} -> {} (instance {})",
                    msg_id, message_name, multi_id
                );
                self.subscriptions.insert(
                    msg_id,
                    Subscription {
                        message_name,
                        multi_id,
                    },
                );
            }
            MSG_REMOVE_LOGGED => {
                let msg_id = payload.read_u16()?;
                self.subscriptions.remove(&msg_id);
            }
            MSG_INFO => self.read_info(&mut payload, false)?,
            MSG_INFO_MULTIPLE => {
                let is_continued = payload.read_byte()? != 0;
                self.read_info(&mut payload, is_continued)?;
            }
            MSG_FLAG_BITS => self.read_flag_bits(&mut payload)?,
            MSG_LOGGING => {
                let level = payload.read_byte()?;
                let timestamp = payload.read_u64()?;
                debug!("[log {}] {} us: {}", level as char, timestamp, payload.read_rest_str());
            }
            MSG_LOGGING_TAGGED => {
                let level = payload.read_byte()?;
                let tag = payload.read_u16()?;
                let timestamp = payload.read_u64()?;
                debug!(
                    "[log {} tag {}] {} us: {}",
                    level as char,
                    tag,
                    timestamp,
                    payload.read_rest_str()
                );
            }
            MSG_DROPOUT => {
                let duration_ms = payload.read_u16()?;
                self.stats.dropouts += 1;
                self.stats.dropout_ms += duration_ms as u64;
                debug!("Dropout of {} ms at offset {}", duration_ms, message.offset);
            }
            MSG_PARAMETER | MSG_PARAMETER_DEFAULT | MSG_SYNC => {
                self.stats.skipped_messages += 1;
            }
            other => {
                debug!(
                    "Skipping unknown message type 0x{:02x} ({} bytes) at offset {}",
                    other,
                    message.payload.len(),
                    message.offset
                );
                self.stats.skipped_messages += 1;
            }
        }

        Ok(None)
    }

    fn decode_data(&mut self, payload: &mut PayloadStream, offset: u64) -> Result<Option<LogRecord>> {
        let msg_id = payload.read_u16()?;
        let Some(subscription) = self.subscriptions.get(&msg_id) else {
            debug!("Data for unsubscribed id {} at offset {}", msg_id, offset);
            self.stats.skipped_messages += 1;
            return Ok(None);
        };
        let Some(format) = self.formats.get(&subscription.message_name) else {
            debug!(
                "No format for subscribed topic '{}'",
                subscription.message_name
            );
            self.stats.skipped_messages += 1;
            return Ok(None);
        };

        let mut fields = HashMap::new();
        let complete = match decode_fields(payload, format, &self.formats, "", &mut fields, 0) {
            Ok(complete) => complete,
            Err(e) => {
                debug!("Cannot decode '{}' at offset {}: {}", format.name, offset, e);
                self.stats.skipped_messages += 1;
                return Ok(None);
            }
        };
        if !complete {
            debug!(
                "Partial '{}' record at offset {} ({} fields decoded)",
                format.name,
                offset,
                fields.len()
            );
        }

        let Some(timestamp_us) = fields.get("timestamp").and_then(FieldValue::as_u64) else {
            debug!("'{}' record without timestamp at offset {}", format.name, offset);
            self.stats.skipped_messages += 1;
            return Ok(None);
        };

        Ok(Some(LogRecord {
            message_name: subscription.message_name.clone(),
            multi_id: subscription.multi_id,
            timestamp_us,
            fields,
        }))
    }

    fn read_info(&mut self, payload: &mut PayloadStream, is_continued: bool) -> Result<()> {
        let key_len = payload.read_byte()? as usize;
        let key = payload.read_str(key_len)?;
        let field = parse_field_spec(&key)?;
        let value_bytes = payload.read_bytes(payload.remaining())?;

        let Some(value) = decode_info_value(&field, value_bytes)? else {
            return Ok(());
        };

        // Continued multi-info messages append to the previous text value
        if is_continued {
            if let (Some(FieldValue::Text(existing)), FieldValue::Text(more)) =
                (self.header.info.get_mut(&field.name), &value)
            {
                existing.push_str(more);
                return Ok(());
            }
        }

        debug!("Info {} = {:?}", field.name, value);
        self.header.info.insert(field.name, value);
        Ok(())
    }

    fn read_flag_bits(&mut self, payload: &mut PayloadStream) -> Result<()> {
        self.header
            .compat_flags
            .copy_from_slice(payload.read_bytes(8)?);
        self.header
            .incompat_flags
            .copy_from_slice(payload.read_bytes(8)?);

        let unknown = self.header.incompat_flags[0] & !INCOMPAT_FLAG_DATA_APPENDED != 0
            || self.header.incompat_flags[1..].iter().any(|&b| b != 0);
        if unknown {
            warn!(
                "Log sets unknown incompatible flags {:?}, decoding may be wrong",
                self.header.incompat_flags
            );
        }
        Ok(())
    }
}

impl<R: Read> Iterator for UlogReader<R> {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fixtures::UlogBuilder;

    #[test]
    fn test_reads_records_in_order() {
        let mut log = UlogBuilder::new();
        log.info_str("sys_name", "PX4");
        log.format("gps:uint64_t timestamp;int32_t lat;int32_t lon;");
        log.subscribe(0, 1, "gps");
        for i in 0..3u64 {
            let mut p = i.to_le_bytes().to_vec();
            p.extend_from_slice(&(i as i32 * 10).to_le_bytes());
            p.extend_from_slice(&(i as i32 * 20).to_le_bytes());
            log.data(1, &p);
        }

        let bytes = log.bytes();
        let mut reader = UlogReader::new(bytes.as_slice()).unwrap();
        let records: Vec<_> = reader.by_ref().collect::<Result<_>>().unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[2].timestamp_us, 2);
        assert_eq!(records[2].get("lon"), Some(&FieldValue::Int(40)));
        assert_eq!(reader.header().info_text("sys_name"), Some("PX4"));
        assert_eq!(reader.stats().data_records, 3);
    }

    #[test]
    fn test_unknown_message_types_are_skipped() {
        let mut log = UlogBuilder::new();
        log.format("t:uint64_t timestamp;");
        log.raw(b'Z', &[1, 2, 3, 4, 5]);
        log.subscribe(0, 3, "t");
        log.raw(b'Y', &[]);
        log.data(3, &9u64.to_le_bytes());
        log.data(99, &1u64.to_le_bytes());

        let bytes = log.bytes();
        let mut reader = UlogReader::new(bytes.as_slice()).unwrap();
        let records: Vec<_> = reader.by_ref().collect::<Result<_>>().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].timestamp_us, 9);
        assert_eq!(reader.stats().skipped_messages, 3);
    }

    #[test]
    fn test_bad_magic_fails_before_any_record() {
        let mut bytes = UlogBuilder::new().bytes();
        bytes[0] = b'X';
        assert!(matches!(
            UlogReader::new(bytes.as_slice()),
            Err(ConvertError::MalformedLog(_))
        ));
    }

    #[test]
    fn test_truncated_message_fails_and_fuses() {
        let mut log = UlogBuilder::new();
        log.format("t:uint64_t timestamp;");
        log.subscribe(0, 1, "t");
        log.data(1, &1u64.to_le_bytes());
        let mut bytes = log.bytes();
        // Declares a 200 byte payload that is not there
        bytes.extend_from_slice(&[200, 0, b'D', 1, 0]);

        let mut reader = UlogReader::new(bytes.as_slice()).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(
            reader.next(),
            Some(Err(ConvertError::MalformedLog(_)))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_hostile_formats_are_skipped() {
        let mut log = UlogBuilder::new();
        log.format("huge:uint64_t timestamp;uint64_t[2305843009213693952] _padding0;");
        log.format("e:");
        log.format("hollow:uint64_t timestamp;e[4000000000] x;");
        log.format("t:uint64_t timestamp;");
        log.subscribe(0, 1, "huge");
        log.subscribe(0, 2, "hollow");
        log.subscribe(0, 3, "t");
        log.data(1, &1u64.to_le_bytes());
        log.data(2, &2u64.to_le_bytes());
        log.data(3, &3u64.to_le_bytes());

        let bytes = log.bytes();
        let mut reader = UlogReader::new(bytes.as_slice()).unwrap();
        let records: Vec<_> = reader.by_ref().collect::<Result<_>>().unwrap();

        let names: Vec<_> = records.iter().map(|r| r.message_name.as_str()).collect();
        assert_eq!(names, vec!["hollow", "t"]);
        assert_eq!(reader.stats().skipped_messages, 1);
    }

    #[test]
    fn test_unsubscribe_and_dropout() {
        let mut log = UlogBuilder::new();
        log.format("t:uint64_t timestamp;");
        log.subscribe(1, 4, "t");
        log.data(4, &5u64.to_le_bytes());
        log.raw(b'O', &250u16.to_le_bytes());
        log.raw(b'R', &4u16.to_le_bytes());
        log.data(4, &6u64.to_le_bytes());

        let bytes = log.bytes();
        let mut reader = UlogReader::new(bytes.as_slice()).unwrap();
        let records: Vec<_> = reader.by_ref().collect::<Result<_>>().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].multi_id, 1);
        assert_eq!(reader.stats().dropouts, 1);
        assert_eq!(reader.stats().dropout_ms, 250);
    }
}
