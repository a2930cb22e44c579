use std::cell::RefCell;
use std::rc::Rc;

use wirewrap_core::core::error::SimError;
use wirewrap_core::core::event::Payload;
use wirewrap_core::core::simulator::Simulator;
use wirewrap_core::device::{Clock, Memory, MemoryConfig, MemoryKind};

/// A standalone memory on bare base names: no multiplexer involved.
fn bare_memory(kind: MemoryKind) -> Simulator {
    Simulator::build(vec![
        Clock::spec("clock"),
        Memory::spec(
            "mem",
            MemoryConfig {
                size: 0x100,
                kind,
                multiplexer: None,
            },
        ),
    ])
    .expect("builds")
}

fn capture(sim: &Simulator, name: &str) -> Rc<RefCell<Vec<Payload>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = Rc::clone(&seen);
        sim.channel()
            .on(
                name,
                Rc::new(move |payload, _ctx| {
                    seen.borrow_mut().push(payload.clone());
                    Ok(())
                }),
            )
            .unwrap();
    }
    seen
}

#[test]
fn test_ui_write_and_read_are_immediate() {
    let sim = bare_memory(MemoryKind::Ram);
    let writes = capture(&sim, "ui:memory:write:result");
    let reads = capture(&sim, "ui:memory:read:result");

    sim.channel()
        .emit(
            "ui:memory:write",
            Payload::Byte {
                address: 0x10,
                data: 0xAB,
            },
        )
        .unwrap();
    sim.channel()
        .emit("ui:memory:read", Payload::Address(0x10))
        .unwrap();

    assert_eq!(writes.borrow().len(), 1);
    assert_eq!(
        *reads.borrow(),
        vec![Payload::Byte {
            address: 0x10,
            data: 0xAB
        }]
    );
}

#[test]
fn test_ui_write_may_target_rom() {
    // The loader path installs ROM images.
    let sim = bare_memory(MemoryKind::Rom);
    sim.channel()
        .emit(
            "ui:memory:write",
            Payload::Byte {
                address: 0x00,
                data: 0x7E,
            },
        )
        .unwrap();
    let mem = sim.module::<Memory>("mem").unwrap();
    assert_eq!(mem.borrow().read(0).unwrap(), 0x7E);
}

#[test]
fn test_cpu_write_to_rom_is_fatal() {
    let sim = bare_memory(MemoryKind::Rom);
    let result = sim.channel().emit(
        "memory:write",
        Payload::Byte {
            address: 0x00,
            data: 0x00,
        },
    );
    assert!(matches!(result, Err(SimError::RomWrite { .. })));
}

#[test]
fn test_cpu_read_arrives_at_result_subcycle() {
    let sim = bare_memory(MemoryKind::Ram);
    sim.channel()
        .emit(
            "ui:memory:write",
            Payload::Byte {
                address: 0x20,
                data: 0x55,
            },
        )
        .unwrap();

    let subcycles = Rc::new(RefCell::new(Vec::new()));
    {
        let subcycles = Rc::clone(&subcycles);
        sim.channel()
            .on(
                "memory:read:result",
                Rc::new(move |_payload, ctx| {
                    subcycles.borrow_mut().push(ctx.subcycle);
                    Ok(())
                }),
            )
            .unwrap();
    }
    sim.channel()
        .emit("memory:read", Payload::Address(0x20))
        .unwrap();
    let clock = sim.module::<Clock>("clock").unwrap();
    clock.borrow().run(1).unwrap();
    assert_eq!(*subcycles.borrow(), vec![99]);
}

#[test]
fn test_bulk_write_and_clear() {
    let sim = bare_memory(MemoryKind::Ram);
    let results = capture(&sim, "ui:memory:bulk:write:result");
    sim.channel()
        .emit(
            "ui:memory:bulk:write",
            Payload::Block {
                address: 0x40,
                bytes: vec![1, 2, 3],
            },
        )
        .unwrap();
    assert_eq!(results.borrow().len(), 1);
    let mem = sim.module::<Memory>("mem").unwrap();
    assert_eq!(mem.borrow().read(0x41).unwrap(), 2);

    // Clear zero-fills without a result event.
    let clears = capture(&sim, "ui:memory:clear");
    sim.channel().emit("ui:memory:clear", Payload::None).unwrap();
    assert_eq!(clears.borrow().len(), 1);
    assert_eq!(mem.borrow().read(0x41).unwrap(), 0);
}

#[test]
fn test_bulk_write_past_end_is_fatal() {
    let sim = bare_memory(MemoryKind::Ram);
    let result = sim.channel().emit(
        "ui:memory:bulk:write",
        Payload::Block {
            address: 0xFF,
            bytes: vec![1, 2],
        },
    );
    assert!(matches!(result, Err(SimError::BulkWriteOverflow { .. })));
}
