//! Binary record layout shared by commands and events.
//!
//! # Record Format
//!
//! ```text
//! [version:u16][source_id:i32][source_sequence:u64][type:u8][time:i64][index:u16][payload_length:u32][payload_type:i32][event_sequence:u64][payload:bytes]
//!      2B            4B               8B              1B        8B         2B             4B                 4B                  8B            variable
//! ```
//!
//! The first seven fields are the stable prefix every reader of a durable log
//! relies on. `payload_type` and `event_sequence` complete the fixed header so
//! the payload always starts at [`HEADER_LENGTH`]. All integers are
//! little-endian.
//!
//! Command records carry `type = 0`, `index = 0` and
//! `event_sequence = NIL_SEQUENCE`. Event records carry their [`EventType`].
//!
//! [`RecordView`] and [`RecordViewMut`] bind onto an existing buffer at an offset
//! without copying; [`RecordView::write_to`] is the only path that copies a
//! record into a different buffer.

use crate::error::{ChronicleError, ChronicleResult};
use crate::id::{CommandId, SourceId};
use crate::sequence::NIL_SEQUENCE;

/// Layout version written into every record.
pub const VERSION: u16 = 1;

pub const VERSION_OFFSET: usize = 0;
pub const SOURCE_ID_OFFSET: usize = 2;
pub const SOURCE_SEQUENCE_OFFSET: usize = 6;
pub const TYPE_OFFSET: usize = 14;
pub const TIME_OFFSET: usize = 15;
pub const INDEX_OFFSET: usize = 23;
pub const PAYLOAD_LENGTH_OFFSET: usize = 25;
pub const PAYLOAD_TYPE_OFFSET: usize = 29;
pub const EVENT_SEQUENCE_OFFSET: usize = 33;

/// Size of the fixed header; the payload starts here.
pub const HEADER_LENGTH: usize = 41;

/// Type byte of a command record.
pub const COMMAND_TYPE: u8 = 0;

/// Payload type of engine-generated events (AUTO_COMMIT, ROLLBACK) with no payload.
pub const SYSTEM_PAYLOAD_TYPE: i32 = -1;

/// Type of an event within its command's event group.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    /// Not the last event of its command.
    Intermediary = 1,
    /// Last event of a command that routed at least one event.
    Commit = 2,
    /// Sole event of a command that routed nothing.
    AutoCommit = 3,
    /// Last event of a command whose effects were rolled back.
    Rollback = 4,
}

impl EventType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Intermediary),
            2 => Some(Self::Commit),
            3 => Some(Self::AutoCommit),
            4 => Some(Self::Rollback),
            _ => None,
        }
    }

    /// Terminal events close a command's event group and advance the dedup watermark.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Intermediary)
    }
}

/// Whether a record holds a command or an event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Command,
    Event(EventType),
}

impl RecordKind {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Command => COMMAND_TYPE,
            Self::Event(event_type) => event_type.as_byte(),
        }
    }

    pub fn from_byte(byte: u8) -> ChronicleResult<Self> {
        if byte == COMMAND_TYPE {
            return Ok(Self::Command);
        }
        EventType::from_byte(byte)
            .map(Self::Event)
            .ok_or_else(|| ChronicleError::invalid_record(format!("unknown record type {byte}")))
    }
}

/// Decoded copy of a record's fixed header.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub source_id: SourceId,
    pub source_sequence: u64,
    pub kind: RecordKind,
    pub time: i64,
    pub index: u16,
    pub payload_length: u32,
    pub payload_type: i32,
    pub event_sequence: u64,
}

impl RecordHeader {
    pub fn command(
        source_id: SourceId,
        source_sequence: u64,
        time: i64,
        payload_type: i32,
        payload_length: u32,
    ) -> Self {
        Self {
            source_id,
            source_sequence,
            kind: RecordKind::Command,
            time,
            index: 0,
            payload_length,
            payload_type,
            event_sequence: NIL_SEQUENCE,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn event(
        command_id: CommandId,
        index: u16,
        event_sequence: u64,
        event_type: EventType,
        time: i64,
        payload_type: i32,
        payload_length: u32,
    ) -> Self {
        Self {
            source_id: command_id.source_id,
            source_sequence: command_id.source_sequence,
            kind: RecordKind::Event(event_type),
            time,
            index,
            payload_length,
            payload_type,
            event_sequence,
        }
    }

    pub fn command_id(&self) -> CommandId {
        CommandId::new(self.source_id, self.source_sequence)
    }

    pub fn is_command(&self) -> bool {
        self.kind == RecordKind::Command
    }

    pub fn event_type(&self) -> Option<EventType> {
        match self.kind {
            RecordKind::Event(event_type) => Some(event_type),
            RecordKind::Command => None,
        }
    }

    pub fn is_terminal_event(&self) -> bool {
        self.event_type().is_some_and(EventType::is_terminal)
    }

    /// Header plus payload length in bytes.
    pub fn record_length(&self) -> usize {
        HEADER_LENGTH + self.payload_length as usize
    }

    /// Write the fixed header at `offset`.
    pub fn encode_into(&self, buffer: &mut [u8], offset: usize) -> ChronicleResult<()> {
        check_bounds(offset, HEADER_LENGTH, buffer.len())?;
        let header = &mut buffer[offset..offset + HEADER_LENGTH];
        header[VERSION_OFFSET..SOURCE_ID_OFFSET].copy_from_slice(&VERSION.to_le_bytes());
        header[SOURCE_ID_OFFSET..SOURCE_SEQUENCE_OFFSET]
            .copy_from_slice(&self.source_id.get().to_le_bytes());
        header[SOURCE_SEQUENCE_OFFSET..TYPE_OFFSET]
            .copy_from_slice(&self.source_sequence.to_le_bytes());
        header[TYPE_OFFSET] = self.kind.as_byte();
        header[TIME_OFFSET..INDEX_OFFSET].copy_from_slice(&self.time.to_le_bytes());
        header[INDEX_OFFSET..PAYLOAD_LENGTH_OFFSET].copy_from_slice(&self.index.to_le_bytes());
        header[PAYLOAD_LENGTH_OFFSET..PAYLOAD_TYPE_OFFSET]
            .copy_from_slice(&self.payload_length.to_le_bytes());
        header[PAYLOAD_TYPE_OFFSET..EVENT_SEQUENCE_OFFSET]
            .copy_from_slice(&self.payload_type.to_le_bytes());
        header[EVENT_SEQUENCE_OFFSET..HEADER_LENGTH]
            .copy_from_slice(&self.event_sequence.to_le_bytes());
        Ok(())
    }

    /// Read and validate the fixed header at `offset`.
    ///
    /// # Errors
    ///
    /// - [`ChronicleError::OutOfBounds`] if fewer than [`HEADER_LENGTH`] bytes remain
    /// - [`ChronicleError::UnsupportedVersion`] if the version field is not [`VERSION`]
    /// - [`ChronicleError::InvalidRecord`] if the type byte is unknown
    pub fn decode(buffer: &[u8], offset: usize) -> ChronicleResult<Self> {
        check_bounds(offset, HEADER_LENGTH, buffer.len())?;
        let header = &buffer[offset..offset + HEADER_LENGTH];

        let version = read_u16(header, VERSION_OFFSET);
        if version != VERSION {
            return Err(ChronicleError::UnsupportedVersion {
                found: version,
                expected: VERSION,
            });
        }

        Ok(Self {
            source_id: SourceId::new(read_i32(header, SOURCE_ID_OFFSET)),
            source_sequence: read_u64(header, SOURCE_SEQUENCE_OFFSET),
            kind: RecordKind::from_byte(header[TYPE_OFFSET])?,
            time: read_i64(header, TIME_OFFSET),
            index: read_u16(header, INDEX_OFFSET),
            payload_length: read_u32(header, PAYLOAD_LENGTH_OFFSET),
            payload_type: read_i32(header, PAYLOAD_TYPE_OFFSET),
            event_sequence: read_u64(header, EVENT_SEQUENCE_OFFSET),
        })
    }

    /// Encode header and `payload` into a freshly allocated record.
    ///
    /// `payload_length` is taken from `payload`, not from `self`.
    pub fn to_record_bytes(&self, payload: &[u8]) -> ChronicleResult<Vec<u8>> {
        let mut header = *self;
        header.payload_length = payload_length_of(payload.len())?;
        let mut bytes = vec![0u8; header.record_length()];
        header.encode_into(&mut bytes, 0)?;
        bytes[HEADER_LENGTH..].copy_from_slice(payload);
        Ok(bytes)
    }
}

/// Read-only view over one record inside a borrowed buffer.
///
/// A default (unwrapped) view has zero capacity: every accessor fails with
/// [`ChronicleError::OutOfBounds`] except [`RecordView::payload`], which returns
/// an empty slice.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RecordView<'a> {
    bytes: &'a [u8],
}

impl<'a> RecordView<'a> {
    pub fn empty() -> Self {
        Self { bytes: &[] }
    }

    /// Bind onto the record starting at `offset` in `buffer`.
    ///
    /// The view covers exactly header plus payload; trailing bytes are ignored.
    pub fn wrap(buffer: &'a [u8], offset: usize) -> ChronicleResult<Self> {
        let header = RecordHeader::decode(buffer, offset)?;
        let length = header.record_length();
        check_bounds(offset, length, buffer.len())?;
        Ok(Self {
            bytes: &buffer[offset..offset + length],
        })
    }

    /// Return to the unwrapped state.
    pub fn reset(&mut self) {
        self.bytes = &[];
    }

    pub fn is_wrapped(&self) -> bool {
        !self.bytes.is_empty()
    }

    /// Bytes covered by this view (header plus payload).
    pub fn encoded_length(&self) -> usize {
        self.bytes.len()
    }

    fn fixed(&self) -> ChronicleResult<&'a [u8]> {
        check_bounds(0, HEADER_LENGTH, self.bytes.len())?;
        Ok(&self.bytes[..HEADER_LENGTH])
    }

    pub fn version(&self) -> ChronicleResult<u16> {
        Ok(read_u16(self.fixed()?, VERSION_OFFSET))
    }

    pub fn source_id(&self) -> ChronicleResult<SourceId> {
        Ok(SourceId::new(read_i32(self.fixed()?, SOURCE_ID_OFFSET)))
    }

    pub fn source_sequence(&self) -> ChronicleResult<u64> {
        Ok(read_u64(self.fixed()?, SOURCE_SEQUENCE_OFFSET))
    }

    pub fn command_id(&self) -> ChronicleResult<CommandId> {
        Ok(CommandId::new(self.source_id()?, self.source_sequence()?))
    }

    pub fn kind(&self) -> ChronicleResult<RecordKind> {
        RecordKind::from_byte(self.fixed()?[TYPE_OFFSET])
    }

    /// Event type of an event record; fails for command records.
    pub fn event_type(&self) -> ChronicleResult<EventType> {
        match self.kind()? {
            RecordKind::Event(event_type) => Ok(event_type),
            RecordKind::Command => Err(ChronicleError::invalid_record(
                "command record has no event type",
            )),
        }
    }

    pub fn time(&self) -> ChronicleResult<i64> {
        Ok(read_i64(self.fixed()?, TIME_OFFSET))
    }

    pub fn index(&self) -> ChronicleResult<u16> {
        Ok(read_u16(self.fixed()?, INDEX_OFFSET))
    }

    pub fn payload_length(&self) -> ChronicleResult<u32> {
        Ok(read_u32(self.fixed()?, PAYLOAD_LENGTH_OFFSET))
    }

    pub fn payload_type(&self) -> ChronicleResult<i32> {
        Ok(read_i32(self.fixed()?, PAYLOAD_TYPE_OFFSET))
    }

    pub fn event_sequence(&self) -> ChronicleResult<u64> {
        Ok(read_u64(self.fixed()?, EVENT_SEQUENCE_OFFSET))
    }

    pub fn header(&self) -> ChronicleResult<RecordHeader> {
        RecordHeader::decode(self.bytes, 0)
    }

    /// Payload bytes; empty for an unwrapped view.
    pub fn payload(&self) -> &'a [u8] {
        if self.bytes.len() <= HEADER_LENGTH {
            return &[];
        }
        &self.bytes[HEADER_LENGTH..]
    }

    /// Copy header and payload into `buffer` at `offset`, returning the bytes written.
    pub fn write_to(&self, buffer: &mut [u8], offset: usize) -> ChronicleResult<usize> {
        self.fixed()?;
        let length = self.bytes.len();
        check_bounds(offset, length, buffer.len())?;
        buffer[offset..offset + length].copy_from_slice(self.bytes);
        Ok(length)
    }
}

/// Mutable view over a record slot inside a borrowed buffer.
///
/// The view spans from `offset` to the end of the buffer; everything after the
/// header is payload capacity.
#[derive(Debug)]
pub struct RecordViewMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> RecordViewMut<'a> {
    /// Write `header` at `offset` and bind onto the slot.
    pub fn init(buffer: &'a mut [u8], offset: usize, header: &RecordHeader) -> ChronicleResult<Self> {
        check_bounds(offset, header.record_length(), buffer.len())?;
        header.encode_into(buffer, offset)?;
        Ok(Self {
            bytes: &mut buffer[offset..],
        })
    }

    /// Bind onto an already encoded record at `offset`.
    pub fn wrap(buffer: &'a mut [u8], offset: usize) -> ChronicleResult<Self> {
        let header = RecordHeader::decode(buffer, offset)?;
        check_bounds(offset, header.record_length(), buffer.len())?;
        Ok(Self {
            bytes: &mut buffer[offset..],
        })
    }

    pub fn payload_capacity(&self) -> usize {
        self.bytes.len() - HEADER_LENGTH
    }

    /// Whole payload capacity, independent of the current payload length.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[HEADER_LENGTH..]
    }

    pub fn set_payload_length(&mut self, length: usize) -> ChronicleResult<()> {
        check_bounds(HEADER_LENGTH, length, self.bytes.len())?;
        let length = payload_length_of(length)?;
        self.bytes[PAYLOAD_LENGTH_OFFSET..PAYLOAD_TYPE_OFFSET].copy_from_slice(&length.to_le_bytes());
        Ok(())
    }

    /// Rewrite the type byte of an event record in place.
    pub fn set_event_type(&mut self, event_type: EventType) -> ChronicleResult<()> {
        if RecordKind::from_byte(self.bytes[TYPE_OFFSET])? == RecordKind::Command {
            return Err(ChronicleError::illegal_state(
                "cannot set an event type on a command record",
            ));
        }
        self.bytes[TYPE_OFFSET] = event_type.as_byte();
        Ok(())
    }

    pub fn record_length(&self) -> usize {
        HEADER_LENGTH + read_u32(self.bytes, PAYLOAD_LENGTH_OFFSET) as usize
    }
}

fn check_bounds(offset: usize, length: usize, capacity: usize) -> ChronicleResult<()> {
    match offset.checked_add(length) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(ChronicleError::out_of_bounds(offset, length, capacity)),
    }
}

fn payload_length_of(length: usize) -> ChronicleResult<u32> {
    u32::try_from(length)
        .map_err(|_| ChronicleError::invalid_record(format!("payload of {length} bytes is too large")))
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&bytes[offset..offset + 2]);
    u16::from_le_bytes(raw)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_le_bytes(raw)
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    u64::from_le_bytes(raw)
}

fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> RecordHeader {
        RecordHeader::event(
            CommandId::new(SourceId::new(11), 22),
            1,
            5,
            EventType::Commit,
            44,
            33,
            0,
        )
    }

    #[test]
    fn prefix_layout_is_bit_exact() {
        let header = RecordHeader::command(SourceId::new(0x0102_0304), 0x1122_3344_5566_7788, -2, 9, 3);
        let bytes = header.to_record_bytes(b"abc").unwrap();

        assert!(header.is_command());
        assert_eq!(bytes.len(), HEADER_LENGTH + 3);
        assert_eq!(&bytes[0..2], &VERSION.to_le_bytes());
        assert_eq!(&bytes[2..6], &0x0102_0304i32.to_le_bytes());
        assert_eq!(&bytes[6..14], &0x1122_3344_5566_7788u64.to_le_bytes());
        assert_eq!(bytes[14], COMMAND_TYPE);
        assert_eq!(&bytes[15..23], &(-2i64).to_le_bytes());
        assert_eq!(&bytes[23..25], &0u16.to_le_bytes());
        assert_eq!(&bytes[25..29], &3u32.to_le_bytes());
        assert_eq!(&bytes[29..33], &9i32.to_le_bytes());
        assert_eq!(&bytes[33..41], &NIL_SEQUENCE.to_le_bytes());
        assert_eq!(&bytes[41..], b"abc");
    }

    #[test]
    fn wrap_reads_record_at_offset_without_copying() {
        let record = sample_event().to_record_bytes(b"hello").unwrap();
        let mut buffer = vec![0xAA; 7];
        buffer.extend_from_slice(&record);
        buffer.extend_from_slice(&[0xBB; 4]);

        let view = RecordView::wrap(&buffer, 7).unwrap();
        assert_eq!(view.source_id().unwrap(), SourceId::new(11));
        assert_eq!(view.source_sequence().unwrap(), 22);
        assert_eq!(view.event_type().unwrap(), EventType::Commit);
        assert_eq!(view.time().unwrap(), 44);
        assert_eq!(view.index().unwrap(), 1);
        assert_eq!(view.payload_type().unwrap(), 33);
        assert_eq!(view.event_sequence().unwrap(), 5);
        assert_eq!(view.payload(), b"hello");
        assert_eq!(view.encoded_length(), record.len());
        assert!(std::ptr::eq(view.payload().as_ptr(), buffer[7 + HEADER_LENGTH..].as_ptr()));
    }

    #[test]
    fn unsupported_version_fails_fast() {
        let mut record = sample_event().to_record_bytes(&[]).unwrap();
        record[0..2].copy_from_slice(&7u16.to_le_bytes());

        assert_eq!(
            RecordView::wrap(&record, 0),
            Err(ChronicleError::UnsupportedVersion {
                found: 7,
                expected: VERSION
            })
        );
    }

    #[test]
    fn truncated_payload_is_out_of_bounds() {
        let record = sample_event().to_record_bytes(b"0123456789").unwrap();
        let err = RecordView::wrap(&record[..record.len() - 1], 0).unwrap_err();
        assert!(matches!(err, ChronicleError::OutOfBounds { .. }));
    }

    #[test]
    fn unwrapped_view_rejects_accessors_but_yields_empty_payload() {
        let record = sample_event().to_record_bytes(b"x").unwrap();
        let mut view = RecordView::wrap(&record, 0).unwrap();
        view.reset();

        assert!(!view.is_wrapped());
        assert!(view.payload().is_empty());
        assert!(matches!(view.version(), Err(ChronicleError::OutOfBounds { .. })));
        assert!(matches!(view.source_id(), Err(ChronicleError::OutOfBounds { .. })));
        assert!(matches!(view.source_sequence(), Err(ChronicleError::OutOfBounds { .. })));
        assert!(matches!(view.event_type(), Err(ChronicleError::OutOfBounds { .. })));
        assert!(matches!(view.time(), Err(ChronicleError::OutOfBounds { .. })));
        assert!(matches!(view.index(), Err(ChronicleError::OutOfBounds { .. })));
        assert!(matches!(view.payload_length(), Err(ChronicleError::OutOfBounds { .. })));
        assert!(matches!(view.payload_type(), Err(ChronicleError::OutOfBounds { .. })));
        assert!(matches!(view.event_sequence(), Err(ChronicleError::OutOfBounds { .. })));
        assert!(matches!(view.header(), Err(ChronicleError::OutOfBounds { .. })));
        let mut target = [0u8; 64];
        assert!(matches!(view.write_to(&mut target, 0), Err(ChronicleError::OutOfBounds { .. })));

        assert_eq!(RecordView::default(), RecordView::empty());
    }

    #[test]
    fn write_to_copies_into_another_buffer() {
        let record = sample_event().to_record_bytes(b"payload").unwrap();
        let view = RecordView::wrap(&record, 0).unwrap();

        let mut target = vec![0u8; record.len() + 3];
        assert_eq!(view.write_to(&mut target, 3).unwrap(), record.len());
        let copy = RecordView::wrap(&target, 3).unwrap();
        assert_eq!(copy.header().unwrap(), view.header().unwrap());
        assert_eq!(copy.payload(), b"payload");

        let mut small = vec![0u8; record.len() - 1];
        assert!(view.write_to(&mut small, 0).is_err());
    }

    #[test]
    fn command_record_has_no_event_type() {
        let record = RecordHeader::command(SourceId::new(1), 0, 0, 0, 0)
            .to_record_bytes(&[])
            .unwrap();
        let view = RecordView::wrap(&record, 0).unwrap();
        assert_eq!(view.kind().unwrap(), RecordKind::Command);
        assert!(matches!(view.event_type(), Err(ChronicleError::InvalidRecord(_))));
    }

    #[test]
    fn mutable_view_patches_type_and_length_in_place() {
        let mut buffer = vec![0u8; HEADER_LENGTH + 16];
        let header = RecordHeader::event(
            CommandId::new(SourceId::new(1), 2),
            0,
            0,
            EventType::Intermediary,
            3,
            4,
            0,
        );
        let mut slot = RecordViewMut::init(&mut buffer, 0, &header).unwrap();
        assert_eq!(slot.payload_capacity(), 16);
        slot.payload_mut()[..3].copy_from_slice(b"abc");
        slot.set_payload_length(3).unwrap();
        slot.set_event_type(EventType::Commit).unwrap();
        assert!(slot.set_payload_length(17).is_err());
        assert_eq!(slot.record_length(), HEADER_LENGTH + 3);

        let view = RecordView::wrap(&buffer, 0).unwrap();
        assert_eq!(view.event_type().unwrap(), EventType::Commit);
        assert_eq!(view.payload(), b"abc");
    }

    #[test]
    fn unknown_type_byte_is_invalid() {
        let mut record = sample_event().to_record_bytes(&[]).unwrap();
        record[TYPE_OFFSET] = 99;
        assert!(matches!(RecordView::wrap(&record, 0), Err(ChronicleError::InvalidRecord(_))));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Property: every header field survives encode/decode at any offset.
            #[test]
            fn header_fields_survive_at_any_offset(
                source in any::<i32>(),
                sequence in any::<u64>(),
                time in any::<i64>(),
                index in any::<u16>(),
                payload_type in any::<i32>(),
                event_sequence in any::<u64>(),
                type_byte in 1u8..=4,
                offset in 0usize..32,
                payload in proptest::collection::vec(any::<u8>(), 0..64),
            ) {
                let header = RecordHeader::event(
                    CommandId::new(SourceId::new(source), sequence),
                    index,
                    event_sequence,
                    EventType::from_byte(type_byte).unwrap(),
                    time,
                    payload_type,
                    payload.len() as u32,
                );
                let record = header.to_record_bytes(&payload).unwrap();
                let mut buffer = vec![0u8; offset];
                buffer.extend_from_slice(&record);

                let view = RecordView::wrap(&buffer, offset).unwrap();
                prop_assert_eq!(view.header().unwrap(), header);
                prop_assert_eq!(view.payload(), payload.as_slice());
            }
        }
    }
}
