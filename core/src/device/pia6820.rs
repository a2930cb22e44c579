//! MC6820/6821 Peripheral Interface Adapter.
//!
//! Each side (A and B) has a data port, an output register latching CPU
//! writes, a data direction register (0=input, 1=output per bit), a
//! control register, and two edge-detected control lines. Register
//! addressing uses RS1:RS0 (four locations) with CRx bit 2 selecting
//! between DDR and data register at offsets 0 and 2.
//!
//! On the bus the PIA occupies four bytes behind a multiplexer and
//! answers at its own result timing (subcycle 90, earlier than memory's
//! 99). Control lines and port inputs arrive as `pia6820:{ca,cb,data_a,
//! data_b}` events; a configured interrupt line is raised as a
//! `signal:*` emission on the flag's rising edge.

use std::cell::RefCell;
use std::rc::Rc;

use log::warn;
use serde::Deserialize;

use crate::core::error::SimError;
use crate::core::event::Payload;
use crate::core::module::{BuiltModule, EventListener, ModuleDeclaration, ModuleSpec};
use crate::core::simulator::{Channel, CyclePriority};
use crate::device::interrupter::SignalKind;
use crate::device::io_name;

/// Device-declared result timing.
pub const RESULT_SUBCYCLE: u32 = 90;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Pia6820Config {
    #[serde(default)]
    pub multiplexer: Option<String>,
    /// Interrupt line wired to IRQA/IRQB, if any.
    #[serde(default)]
    pub irq: Option<SignalKind>,
}

/// Register file and line state; pure, no bus knowledge.
struct PiaState {
    output_a: u8,
    ddr_a: u8,
    ctrl_a: u8,
    input_a: u8,

    output_b: u8,
    ddr_b: u8,
    ctrl_b: u8,
    input_b: u8,

    irq_a1: bool,
    irq_a2: bool,
    irq_b1: bool,
    irq_b2: bool,

    ca1: bool,
    ca2: bool,
    cb1: bool,
    cb2: bool,
}

impl PiaState {
    fn new() -> Self {
        Self {
            output_a: 0,
            ddr_a: 0,
            ctrl_a: 0,
            input_a: 0,
            output_b: 0,
            ddr_b: 0,
            ctrl_b: 0,
            input_b: 0,
            irq_a1: false,
            irq_a2: false,
            irq_b1: false,
            irq_b2: false,
            ca1: false,
            ca2: false,
            cb1: false,
            cb2: false,
        }
    }

    /// Read a register. Reading a data port clears that side's flags.
    fn read(&mut self, offset: u16) -> u8 {
        match offset & 0x03 {
            0 => {
                if self.ctrl_a & 0x04 != 0 {
                    self.irq_a1 = false;
                    self.irq_a2 = false;
                    (self.input_a & !self.ddr_a) | (self.output_a & self.ddr_a)
                } else {
                    self.ddr_a
                }
            }
            1 => ((self.irq_a1 as u8) << 7) | ((self.irq_a2 as u8) << 6) | (self.ctrl_a & 0x3F),
            2 => {
                if self.ctrl_b & 0x04 != 0 {
                    self.irq_b1 = false;
                    self.irq_b2 = false;
                    (self.input_b & !self.ddr_b) | (self.output_b & self.ddr_b)
                } else {
                    self.ddr_b
                }
            }
            _ => ((self.irq_b1 as u8) << 7) | ((self.irq_b2 as u8) << 6) | (self.ctrl_b & 0x3F),
        }
    }

    fn write(&mut self, offset: u16, data: u8) {
        match offset & 0x03 {
            0 => {
                if self.ctrl_a & 0x04 != 0 {
                    self.output_a = data;
                } else {
                    self.ddr_a = data;
                }
            }
            1 => self.ctrl_a = data & 0x3F,
            2 => {
                if self.ctrl_b & 0x04 != 0 {
                    self.output_b = data;
                } else {
                    self.ddr_b = data;
                }
            }
            _ => self.ctrl_b = data & 0x3F,
        }
    }

    /// CA1/CB1 transition. CRx bit 1 selects the active edge
    /// (0=falling, 1=rising); a matching edge latches the flag.
    fn set_line1(&mut self, side_b: bool, state: bool) {
        let (current, ctrl) = if side_b {
            (self.cb1, self.ctrl_b)
        } else {
            (self.ca1, self.ctrl_a)
        };
        let rising = !current && state;
        let falling = current && !state;
        let active = if ctrl & 0x02 != 0 { rising } else { falling };
        if side_b {
            self.cb1 = state;
            if active {
                self.irq_b1 = true;
            }
        } else {
            self.ca1 = state;
            if active {
                self.irq_a1 = true;
            }
        }
    }

    /// CA2/CB2 transition, input mode only (CRx bit 5 clear).
    fn set_line2(&mut self, side_b: bool, state: bool) {
        let (current, ctrl) = if side_b {
            (self.cb2, self.ctrl_b)
        } else {
            (self.ca2, self.ctrl_a)
        };
        let input_mode = ctrl & 0x20 == 0;
        let rising = !current && state;
        let falling = current && !state;
        let active = input_mode && if ctrl & 0x10 != 0 { rising } else { falling };
        if side_b {
            self.cb2 = state;
            if active {
                self.irq_b2 = true;
            }
        } else {
            self.ca2 = state;
            if active {
                self.irq_a2 = true;
            }
        }
    }

    /// IRQ asserted for a side when a flag is set and its control enable
    /// bit (CRx bit 0 for x1, bit 3 for x2 input mode) is on.
    fn irq_a(&self) -> bool {
        (self.irq_a1 && self.ctrl_a & 0x01 != 0)
            || (self.irq_a2 && self.ctrl_a & 0x20 == 0 && self.ctrl_a & 0x08 != 0)
    }

    fn irq_b(&self) -> bool {
        (self.irq_b1 && self.ctrl_b & 0x01 != 0)
            || (self.irq_b2 && self.ctrl_b & 0x20 == 0 && self.ctrl_b & 0x08 != 0)
    }
}

pub struct Pia6820 {
    state: PiaState,
    irq_line: bool,
}

impl Pia6820 {
    pub fn spec(id: impl Into<String>, config: Pia6820Config) -> ModuleSpec {
        ModuleSpec::new(id, move |id, channel| {
            let pia = Rc::new(RefCell::new(Pia6820 {
                state: PiaState::new(),
                irq_line: false,
            }));
            let declaration = Self::declaration(&pia, &id, &config, &channel);
            Ok(BuiltModule {
                declaration,
                instance: pia,
            })
        })
    }

    pub fn output_a(&self) -> u8 {
        self.state.output_a
    }

    pub fn output_b(&self) -> u8 {
        self.state.output_b
    }

    /// Re-evaluate the interrupt line; emits on the rising edge.
    fn sync_irq(
        pia: &Rc<RefCell<Pia6820>>,
        channel: &Channel,
        irq: Option<SignalKind>,
    ) -> Result<(), SimError> {
        let Some(kind) = irq else {
            return Ok(());
        };
        let fire = {
            let mut pia = pia.borrow_mut();
            let asserted = pia.state.irq_a() || pia.state.irq_b();
            let rising = asserted && !pia.irq_line;
            pia.irq_line = asserted;
            rising
        };
        if fire {
            channel.emit(kind.event(), Payload::None)?;
        }
        Ok(())
    }

    fn declaration(
        pia: &Rc<RefCell<Pia6820>>,
        id: &str,
        config: &Pia6820Config,
        channel: &Channel,
    ) -> ModuleDeclaration {
        let mut declaration = ModuleDeclaration::new();
        let in_group = config.multiplexer.as_deref().map(|_| id.to_string());
        let out_group = config.multiplexer.clone();
        let irq = config.irq;

        declaration.provided = ["memory:read:result", "memory:write:result"]
            .iter()
            .map(|base| io_name(base, out_group.as_deref()))
            .collect();
        if let Some(kind) = irq {
            declaration.provided.push(kind.event().to_string());
        }

        // Register reads: data-port reads clear flags, so the register
        // access itself happens at response time.
        {
            let pia = Rc::clone(pia);
            let channel = channel.clone();
            let name = io_name("memory:read:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Address(address) = payload else {
                    return Ok(());
                };
                if *address > 3 {
                    warn!("pia6820 read past register file at {address}");
                    return Ok(());
                }
                let address = *address;
                let pia = Rc::clone(&pia);
                let channel_inner = channel.clone();
                let name = name.clone();
                channel.once_cycle(
                    Rc::new(move |_cycle, _subcycle| {
                        let data = pia.borrow_mut().state.read(address);
                        channel_inner.emit(&name, Payload::Byte { address, data })
                    }),
                    CyclePriority::this_cycle(RESULT_SUBCYCLE),
                )
            });
            declaration
                .optional
                .push((io_name("memory:read", in_group.as_deref()), listener));
        }

        // Register writes.
        {
            let pia = Rc::clone(pia);
            let channel = channel.clone();
            let name = io_name("memory:write:result", out_group.as_deref());
            let listener: EventListener = Rc::new(move |payload, _ctx| {
                let Payload::Byte { address, data } = payload else {
                    return Ok(());
                };
                if *address > 3 {
                    warn!("pia6820 write past register file at {address}");
                    return Ok(());
                }
                pia.borrow_mut().state.write(*address, *data);
                Self::sync_irq(&pia, &channel, irq)?;
                let address = *address;
                let data = *data;
                let channel_inner = channel.clone();
                let name = name.clone();
                channel.once_cycle(
                    Rc::new(move |_cycle, _subcycle| {
                        channel_inner.emit(&name, Payload::Byte { address, data })
                    }),
                    CyclePriority::this_cycle(RESULT_SUBCYCLE),
                )
            });
            declaration
                .optional
                .push((io_name("memory:write", in_group.as_deref()), listener));
        }

        // Control lines and port inputs.
        let control = |side_b: bool| {
            let pia = Rc::clone(pia);
            let channel = channel.clone();
            Rc::new(move |payload: &Payload, _ctx: &crate::core::event::EventContext| {
                let Payload::Control { line, state } = payload else {
                    return Ok(());
                };
                {
                    let mut pia = pia.borrow_mut();
                    match line {
                        1 => pia.state.set_line1(side_b, *state),
                        2 => pia.state.set_line2(side_b, *state),
                        other => {
                            warn!("pia6820: unknown control line {other}");
                            return Ok(());
                        }
                    }
                }
                Self::sync_irq(&pia, &channel, irq)
            }) as EventListener
        };
        // Host-injected lines; a system need not drive them.
        declaration.optional.push(("pia6820:ca".to_string(), control(false)));
        declaration.optional.push(("pia6820:cb".to_string(), control(true)));

        let port = |side_b: bool| {
            let pia = Rc::clone(pia);
            Rc::new(move |payload: &Payload, _ctx: &crate::core::event::EventContext| {
                if let Payload::Data(data) = payload {
                    let mut pia = pia.borrow_mut();
                    if side_b {
                        pia.state.input_b = *data;
                    } else {
                        pia.state.input_a = *data;
                    }
                }
                Ok(())
            }) as EventListener
        };
        declaration
            .optional
            .push(("pia6820:data_a".to_string(), port(false)));
        declaration
            .optional
            .push(("pia6820:data_b".to_string(), port(true)));

        declaration
    }
}
