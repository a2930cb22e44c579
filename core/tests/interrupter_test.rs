use std::cell::RefCell;
use std::rc::Rc;

use wirewrap_core::core::event::Payload;
use wirewrap_core::core::simulator::Simulator;
use wirewrap_core::device::{
    Clock, Interrupter, InterrupterConfig, Multiplexer, MultiplexerConfig, MultiplexerEntry,
    SignalKind,
};

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

fn run(sim: &Simulator, cycles: u64) {
    let clock = sim.module::<Clock>("clock").unwrap();
    let clock = clock.borrow();
    clock.run(cycles).unwrap();
}

#[test]
fn test_fires_every_n_cycles() {
    let sim = Simulator::build(vec![
        Clock::spec("clock"),
        Interrupter::spec(
            "intr",
            InterrupterConfig {
                each: 4,
                kind: SignalKind::Irq,
                multiplexer: None,
            },
        ),
    ])
    .expect("builds");
    let irqs = capture(&sim, "signal:irq");

    run(&sim, 3);
    assert!(irqs.borrow().is_empty());
    run(&sim, 1);
    assert_eq!(irqs.borrow().len(), 1);
    run(&sim, 8);
    assert_eq!(irqs.borrow().len(), 3);
}

#[test]
fn test_zero_period_disables() {
    let sim = Simulator::build(vec![
        Clock::spec("clock"),
        Interrupter::spec(
            "intr",
            InterrupterConfig {
                each: 0,
                kind: SignalKind::Nmi,
                multiplexer: None,
            },
        ),
    ])
    .expect("builds");
    let nmis = capture(&sim, "signal:nmi");
    run(&sim, 50);
    assert!(nmis.borrow().is_empty());
}

fn device_mode_system() -> Simulator {
    Simulator::build(vec![
        Clock::spec("clock"),
        Multiplexer::spec(
            "mux",
            MultiplexerConfig {
                entries: vec![MultiplexerEntry {
                    module: "intr".to_string(),
                    start: 0xFF10,
                    size: 3,
                    priority: 0,
                }],
            },
        ),
        Interrupter::spec(
            "intr",
            InterrupterConfig {
                each: 0,
                kind: SignalKind::Irq,
                multiplexer: Some("mux".to_string()),
            },
        ),
    ])
    .expect("builds")
}

#[test]
fn test_device_mode_reprogramming() {
    let sim = device_mode_system();
    let firqs = capture(&sim, "signal:firq");

    // Program each=2 and type=firq through the register window.
    for (addr, data) in [(0xFF10u16, 0x00u8), (0xFF11, 0x02), (0xFF12, 0x02)] {
        sim.channel()
            .emit("memory:write", Payload::Byte { address: addr, data })
            .unwrap();
        run(&sim, 1);
    }
    let intr = sim.module::<Interrupter>("intr").unwrap();
    assert_eq!(intr.borrow().each(), 2);
    assert_eq!(intr.borrow().kind(), SignalKind::Firq);

    let before = firqs.borrow().len();
    run(&sim, 4);
    assert_eq!(firqs.borrow().len() - before, 2);
}

#[test]
fn test_device_mode_readback_at_subcycle_90() {
    let sim = device_mode_system();
    // Program each = 0x1234.
    sim.channel()
        .emit(
            "memory:write",
            Payload::Byte {
                address: 0xFF10,
                data: 0x12,
            },
        )
        .unwrap();
    run(&sim, 1);

    let subcycles = Rc::new(RefCell::new(Vec::new()));
    let values = Rc::new(RefCell::new(Vec::new()));
    {
        let subcycles = Rc::clone(&subcycles);
        let values = Rc::clone(&values);
        sim.channel()
            .on(
                "memory:read:result",
                Rc::new(move |payload, ctx| {
                    if let Payload::Byte { data, .. } = payload {
                        subcycles.borrow_mut().push(ctx.subcycle);
                        values.borrow_mut().push(*data);
                    }
                    Ok(())
                }),
            )
            .unwrap();
    }
    sim.channel()
        .emit("memory:read", Payload::Address(0xFF10))
        .unwrap();
    run(&sim, 1);
    assert_eq!(*subcycles.borrow(), vec![90]);
    assert_eq!(*values.borrow(), vec![0x12]);
}
