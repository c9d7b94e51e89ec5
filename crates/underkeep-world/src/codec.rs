//! Entity serializer: one logical schema, two encodings.
//!
//! Both encodings write the [`EntityTag`] first, then the common header,
//! then the kind-specific body:
//!
//! - **stream**: one tab-delimited line per entity, for save files.
//! - **packet**: sequential fixed-width binary fields, for live replication.
//!
//! Bodies are read and written through an [`EntityCodecRegistry`] built once
//! at startup. Decoding an unknown or unregistered tag fails; there is no
//! default entity to fall back to.

use crate::entity::{
    AnimationState, CreatureBody, Entity, EntityBody, EntityHeader, EntityTag, Lifetime, Position,
};
use crate::spell::SpellType;
use std::collections::BTreeMap;
use underkeep_core::id::SeatId;
use underkeep_core::packet::{Packet, PacketError, PacketReader};
use underkeep_core::stream::{StreamError, StreamReader, StreamWriter};
use underkeep_research::ResearchType;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("unknown entity tag {0:?}")]
    UnknownTag(String),

    #[error("no codec registered for entity tag {0}")]
    Unregistered(EntityTag),

    #[error("codec for {expected} given a {found} body")]
    BodyMismatch { expected: EntityTag, found: EntityTag },

    #[error("unknown research: {0}")]
    UnknownResearch(String),

    #[error("spell {0} does not persist as an entity")]
    NotPersistable(SpellType),

    #[error("invalid spell lifetime: {0}")]
    InvalidLifetime(i64),

    #[error("{0} unread bytes after entity")]
    TrailingBytes(usize),

    #[error("unread fields after entity")]
    TrailingFields,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type ReadStreamFn = fn(&mut StreamReader<'_>) -> Result<EntityBody, CodecError>;
type WriteStreamFn = fn(&EntityBody, &mut StreamWriter) -> Result<(), CodecError>;
type ReadPacketFn = fn(&mut PacketReader<'_>) -> Result<EntityBody, CodecError>;
type WritePacketFn = fn(&EntityBody, &mut Packet) -> Result<(), CodecError>;

/// Body codec for one entity kind.
#[derive(Clone, Copy)]
pub struct EntityCodec {
    pub tag: EntityTag,
    /// Body column names, in stream order.
    pub columns: &'static [&'static str],
    pub read_stream: ReadStreamFn,
    pub write_stream: WriteStreamFn,
    pub read_packet: ReadPacketFn,
    pub write_packet: WritePacketFn,
}

/// Header column names, in stream order, after the tag.
pub const HEADER_COLUMNS: &[&str] = &[
    "name", "seat", "x", "y", "z", "rotation", "animation", "loop",
];

/// Tag-indexed body codecs.
#[derive(Clone, Default)]
pub struct EntityCodecRegistry {
    codecs: BTreeMap<EntityTag, EntityCodec>,
}

impl EntityCodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in entity kind.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(CREATURE_CODEC);
        registry.register(CARRIER_CODEC);
        registry.register(SPELL_CODEC);
        registry
    }

    /// Register a codec, replacing any previous one for the same tag.
    pub fn register(&mut self, codec: EntityCodec) {
        self.codecs.insert(codec.tag, codec);
    }

    pub fn get(&self, tag: EntityTag) -> Option<&EntityCodec> {
        self.codecs.get(&tag)
    }

    fn codec(&self, tag: EntityTag) -> Result<&EntityCodec, CodecError> {
        self.get(tag).ok_or(CodecError::Unregistered(tag))
    }

    /// Column description line for a kind, as written at the top of a save
    /// file section.
    pub fn format_line(&self, tag: EntityTag) -> Option<String> {
        let codec = self.get(tag)?;
        let mut columns = vec!["tag"];
        columns.extend_from_slice(HEADER_COLUMNS);
        columns.extend_from_slice(codec.columns);
        Some(format!("# {}", columns.join("\t")))
    }

    // -- Stream --

    pub fn encode_stream(&self, entity: &Entity) -> Result<String, CodecError> {
        let codec = self.codec(entity.tag())?;
        let mut writer = StreamWriter::new();
        writer.field("tag", codec.tag.name())?;
        write_header_stream(&entity.header, &mut writer)?;
        (codec.write_stream)(&entity.body, &mut writer)?;
        Ok(writer.finish())
    }

    pub fn decode_stream(&self, line: &str) -> Result<Entity, CodecError> {
        let mut reader = StreamReader::new(line);
        let token = reader.token("tag")?;
        let tag: EntityTag = token.parse().map_err(CodecError::UnknownTag)?;
        let codec = self.codec(tag)?;

        let header = read_header_stream(&mut reader)?;
        let body = (codec.read_stream)(&mut reader)?;
        if !reader.is_exhausted() {
            return Err(CodecError::TrailingFields);
        }
        Ok(Entity::new(header, body))
    }

    // -- Packet --

    pub fn encode_packet(&self, entity: &Entity) -> Result<Vec<u8>, CodecError> {
        let mut packet = Packet::new();
        self.write_packet(entity, &mut packet)?;
        Ok(packet.into_bytes())
    }

    /// Append an entity to a packet under construction.
    pub fn write_packet(&self, entity: &Entity, packet: &mut Packet) -> Result<(), CodecError> {
        let codec = self.codec(entity.tag())?;
        packet.put(&codec.tag.code())?;
        write_header_packet(&entity.header, packet)?;
        (codec.write_packet)(&entity.body, packet)
    }

    /// Decode a packet holding exactly one entity.
    pub fn decode_packet(&self, bytes: &[u8]) -> Result<Entity, CodecError> {
        let mut reader = PacketReader::new(bytes);
        let entity = self.read_packet(&mut reader)?;
        if !reader.is_empty() {
            return Err(CodecError::TrailingBytes(reader.remaining().len()));
        }
        Ok(entity)
    }

    /// Read one entity from a packet, leaving the reader after it.
    pub fn read_packet(&self, reader: &mut PacketReader<'_>) -> Result<Entity, CodecError> {
        let code: u16 = reader.get()?;
        let tag = EntityTag::from_code(code)
            .ok_or_else(|| CodecError::UnknownTag(code.to_string()))?;
        let codec = self.codec(tag)?;

        let header = read_header_packet(reader)?;
        let body = (codec.read_packet)(reader)?;
        Ok(Entity::new(header, body))
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

fn write_header_stream(header: &EntityHeader, w: &mut StreamWriter) -> Result<(), CodecError> {
    w.field("name", &header.name)?
        .field("seat", &header.seat.0)?
        .field("x", &header.position.x)?
        .field("y", &header.position.y)?
        .field("z", &header.position.z)?
        .field("rotation", &header.rotation)?
        .field("animation", &header.animation.name)?
        .field("loop", &u8::from(header.animation.looping))?;
    Ok(())
}

fn read_header_stream(r: &mut StreamReader<'_>) -> Result<EntityHeader, CodecError> {
    let name = r.token("name")?.to_string();
    let seat = SeatId(r.parse("seat")?);
    let position = Position::new(r.parse("x")?, r.parse("y")?, r.parse("z")?);
    let rotation = r.parse("rotation")?;
    let animation = r.token("animation")?.to_string();
    let looping: u8 = r.parse("loop")?;
    Ok(EntityHeader {
        name,
        seat,
        position,
        rotation,
        animation: AnimationState::new(animation, looping != 0),
    })
}

fn write_header_packet(header: &EntityHeader, p: &mut Packet) -> Result<(), CodecError> {
    p.put(&header.name)?
        .put(&header.seat.0)?
        .put(&header.position.x)?
        .put(&header.position.y)?
        .put(&header.position.z)?
        .put(&header.rotation)?
        .put(&header.animation.name)?
        .put(&header.animation.looping)?;
    Ok(())
}

fn read_header_packet(r: &mut PacketReader<'_>) -> Result<EntityHeader, CodecError> {
    let name: String = r.get()?;
    let seat = SeatId(r.get()?);
    let position = Position::new(r.get()?, r.get()?, r.get()?);
    let rotation = r.get()?;
    let animation: String = r.get()?;
    let looping = r.get()?;
    Ok(EntityHeader {
        name,
        seat,
        position,
        rotation,
        animation: AnimationState::new(animation, looping),
    })
}

// ---------------------------------------------------------------------------
// Creature
// ---------------------------------------------------------------------------

const CREATURE_CODEC: EntityCodec = EntityCodec {
    tag: EntityTag::Creature,
    columns: &["class", "hp", "max_hp", "level"],
    read_stream: |r| {
        Ok(EntityBody::Creature(CreatureBody {
            class: r.token("class")?.to_string(),
            hp: r.parse("hp")?,
            max_hp: r.parse("max_hp")?,
            level: r.parse("level")?,
        }))
    },
    write_stream: |body, w| {
        let EntityBody::Creature(c) = body else {
            return Err(mismatch(EntityTag::Creature, body));
        };
        w.field("class", &c.class)?
            .field("hp", &c.hp)?
            .field("max_hp", &c.max_hp)?
            .field("level", &c.level)?;
        Ok(())
    },
    read_packet: |r| {
        Ok(EntityBody::Creature(CreatureBody {
            class: r.get()?,
            hp: r.get()?,
            max_hp: r.get()?,
            level: r.get()?,
        }))
    },
    write_packet: |body, p| {
        let EntityBody::Creature(c) = body else {
            return Err(mismatch(EntityTag::Creature, body));
        };
        p.put(&c.class)?.put(&c.hp)?.put(&c.max_hp)?.put(&c.level)?;
        Ok(())
    },
};

// ---------------------------------------------------------------------------
// Research carrier
// ---------------------------------------------------------------------------

const CARRIER_CODEC: EntityCodec = EntityCodec {
    tag: EntityTag::ResearchCarrier,
    columns: &["research"],
    read_stream: |r| {
        let name = r.token("research")?;
        let research: ResearchType = name
            .parse()
            .map_err(|_| CodecError::UnknownResearch(name.to_string()))?;
        Ok(EntityBody::ResearchCarrier { research })
    },
    write_stream: |body, w| {
        let EntityBody::ResearchCarrier { research } = body else {
            return Err(mismatch(EntityTag::ResearchCarrier, body));
        };
        w.field("research", research)?;
        Ok(())
    },
    read_packet: |r| {
        let code: u32 = r.get()?;
        let research = ResearchType::from_code(code)
            .ok_or_else(|| CodecError::UnknownResearch(code.to_string()))?;
        Ok(EntityBody::ResearchCarrier { research })
    },
    write_packet: |body, p| {
        let EntityBody::ResearchCarrier { research } = body else {
            return Err(mismatch(EntityTag::ResearchCarrier, body));
        };
        p.put(&research.code())?;
        Ok(())
    },
};

// ---------------------------------------------------------------------------
// Spell
// ---------------------------------------------------------------------------

fn lasting_spell(code: u32) -> Result<SpellType, CodecError> {
    let spell = SpellType::from_code(code);
    if !spell.is_lasting() {
        return Err(CodecError::NotPersistable(spell));
    }
    Ok(spell)
}

fn lifetime(raw: i64) -> Result<Lifetime, CodecError> {
    Lifetime::from_raw(raw).ok_or(CodecError::InvalidLifetime(raw))
}

const SPELL_CODEC: EntityCodec = EntityCodec {
    tag: EntityTag::Spell,
    columns: &["spell", "lifetime"],
    read_stream: |r| {
        let spell = lasting_spell(r.parse("spell")?)?;
        let lifetime = lifetime(r.parse("lifetime")?)?;
        Ok(EntityBody::Spell { spell, lifetime })
    },
    write_stream: |body, w| {
        let EntityBody::Spell { spell, lifetime } = body else {
            return Err(mismatch(EntityTag::Spell, body));
        };
        if !spell.is_lasting() {
            return Err(CodecError::NotPersistable(*spell));
        }
        w.field("spell", &spell.code())?
            .field("lifetime", &lifetime.to_raw())?;
        Ok(())
    },
    read_packet: |r| {
        let spell = lasting_spell(r.get()?)?;
        let lifetime = lifetime(r.get()?)?;
        Ok(EntityBody::Spell { spell, lifetime })
    },
    write_packet: |body, p| {
        let EntityBody::Spell { spell, lifetime } = body else {
            return Err(mismatch(EntityTag::Spell, body));
        };
        if !spell.is_lasting() {
            return Err(CodecError::NotPersistable(*spell));
        }
        p.put(&spell.code())?.put(&lifetime.to_raw())?;
        Ok(())
    },
};

fn mismatch(expected: EntityTag, body: &EntityBody) -> CodecError {
    CodecError::BodyMismatch {
        expected,
        found: body.tag(),
    }
}

// ===========================================================================
// Tests
// ===========================================================================
