//! Integration test: Entity Codecs
//!
//! Any replicable entity decodes to itself from both encodings, entities
//! packed back to back in one packet read out in order, and a save file of
//! stream lines reloads into an equal world population.

use proptest::prelude::*;
use underkeep_core::id::SeatId;
use underkeep_core::packet::{Packet, PacketReader};
use underkeep_research::ResearchType;
use underkeep_world::codec::{CodecError, EntityCodecRegistry};
use underkeep_world::entity::{
    AnimationState, CreatureBody, Entity, EntityBody, EntityHeader, EntityTag, Lifetime, Position,
};
use underkeep_world::spell::SpellType;

// ===========================================================================
// Generators
// ===========================================================================

fn arb_word() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_]{0,15}"
}

fn arb_header() -> impl Strategy<Value = EntityHeader> {
    (
        arb_word(),
        1u32..8,
        (-500.0f32..500.0, -500.0f32..500.0, -5.0f32..5.0),
        0.0f32..360.0,
        (arb_word(), any::<bool>()),
    )
        .prop_map(|(name, seat, (x, y, z), rotation, (animation, looping))| EntityHeader {
            name,
            seat: SeatId(seat),
            position: Position::new(x, y, z),
            rotation,
            animation: AnimationState::new(animation, looping),
        })
}

fn arb_body() -> impl Strategy<Value = EntityBody> {
    prop_oneof![
        (arb_word(), 0u32..500, 1u32..500, 1u32..30).prop_map(|(class, hp, max_hp, level)| {
            EntityBody::Creature(CreatureBody {
                class,
                hp,
                max_hp,
                level,
            })
        }),
        proptest::sample::select(ResearchType::ALL.to_vec())
            .prop_map(|research| EntityBody::ResearchCarrier { research }),
        prop_oneof![Just(Lifetime::Permanent), (0u32..1000).prop_map(Lifetime::Turns)].prop_map(
            |lifetime| EntityBody::Spell {
                spell: SpellType::CallToWar,
                lifetime,
            }
        ),
    ]
}

fn arb_entity() -> impl Strategy<Value = Entity> {
    (arb_header(), arb_body()).prop_map(|(header, body)| Entity::new(header, body))
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn both_encodings_decode_to_the_same_entity(entity in arb_entity()) {
        let codecs = EntityCodecRegistry::standard();

        let line = codecs.encode_stream(&entity).unwrap();
        let from_line = codecs.decode_stream(&line).unwrap();
        prop_assert_eq!(codecs.encode_stream(&from_line).unwrap(), line);
        prop_assert_eq!(&from_line, &entity);

        let bytes = codecs.encode_packet(&entity).unwrap();
        let from_bytes = codecs.decode_packet(&bytes).unwrap();
        prop_assert_eq!(codecs.encode_packet(&from_bytes).unwrap(), bytes);
        prop_assert_eq!(from_bytes, entity);
    }

    #[test]
    fn packed_entities_read_back_in_order(
        entities in proptest::collection::vec(arb_entity(), 1..8)
    ) {
        let codecs = EntityCodecRegistry::standard();
        let mut packet = Packet::new();
        for entity in &entities {
            codecs.write_packet(entity, &mut packet).unwrap();
        }

        let bytes = packet.into_bytes();
        let mut reader = PacketReader::new(&bytes);
        for entity in &entities {
            prop_assert_eq!(&codecs.read_packet(&mut reader).unwrap(), entity);
        }
        prop_assert!(reader.is_empty());
    }

    /// Cutting a packet short is always an error, never a wrong entity.
    #[test]
    fn truncated_packet_fails(entity in arb_entity(), cut in 1usize..64) {
        let codecs = EntityCodecRegistry::standard();
        let bytes = codecs.encode_packet(&entity).unwrap();
        let keep = bytes.len().saturating_sub(cut);
        prop_assert!(codecs.decode_packet(&bytes[..keep]).is_err());
    }
}

// ===========================================================================
// Save files
// ===========================================================================

#[test]
fn save_file_sections_reload() {
    let codecs = EntityCodecRegistry::standard();
    let entities = vec![
        Entity::new(
            EntityHeader::new("Imp_1", SeatId(1), Position::new(2.0, 3.5, 0.0)),
            EntityBody::Creature(CreatureBody {
                class: "Worker".into(),
                hp: 12,
                max_hp: 30,
                level: 1,
            }),
        ),
        Entity::new(
            EntityHeader::new("ResearchEntity_1", SeatId(1), Position::default()),
            EntityBody::ResearchCarrier {
                research: ResearchType::RoomForge,
            },
        ),
        Entity::new(
            EntityHeader::new("CallToWar_1", SeatId(2), Position::new(7.0, 7.0, 0.0)),
            EntityBody::Spell {
                spell: SpellType::CallToWar,
                lifetime: Lifetime::Turns(12),
            },
        ),
    ];

    // One section per kind, each opened by its column line.
    let mut file = String::new();
    for tag in EntityTag::ALL {
        file.push_str(&codecs.format_line(tag).unwrap());
        file.push('\n');
        for entity in entities.iter().filter(|e| e.tag() == tag) {
            file.push_str(&codecs.encode_stream(entity).unwrap());
            file.push('\n');
        }
    }

    let reloaded: Vec<Entity> = file
        .lines()
        .filter(|line| !line.starts_with('#'))
        .map(|line| codecs.decode_stream(line).unwrap())
        .collect();
    assert_eq!(reloaded, entities);
}

#[test]
fn short_lived_spells_do_not_persist() {
    let codecs = EntityCodecRegistry::standard();
    let heal = Entity::new(
        EntityHeader::new("Heal_1", SeatId(1), Position::default()),
        EntityBody::Spell {
            spell: SpellType::CreatureHeal,
            lifetime: Lifetime::Turns(1),
        },
    );
    assert!(matches!(
        codecs.encode_stream(&heal),
        Err(CodecError::NotPersistable(SpellType::CreatureHeal))
    ));
    assert!(matches!(
        codecs.encode_packet(&heal),
        Err(CodecError::NotPersistable(SpellType::CreatureHeal))
    ));
}

#[test]
fn registry_without_a_kind_refuses_it() {
    let codecs = EntityCodecRegistry::new();
    let carrier = Entity::new(
        EntityHeader::new("ResearchEntity_1", SeatId(1), Position::default()),
        EntityBody::ResearchCarrier {
            research: ResearchType::RoomCrypt,
        },
    );
    assert!(matches!(
        codecs.encode_packet(&carrier),
        Err(CodecError::Unregistered(EntityTag::ResearchCarrier))
    ));
    assert!(codecs.format_line(EntityTag::Creature).is_none());
}
