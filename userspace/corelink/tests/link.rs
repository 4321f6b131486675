// Copyright 2026 CoreLink Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios over the loopback doubles: bring-up, startup
//! broadcast, steady-state sends, and the interrupt-side queue glue.

use corelink::{
    isr, AppState, Error, InboundQueue, Link, LinkConfig, ObjKind, ObjState, Role, STAGING_WORDS,
};
use corelink_hal::loopback::{ArrayMemory, FlagBoard, ManualClock, ScriptedTransport};
use corelink_hal::{Command, Flag, Message, Readiness, Response, WordAddr};

const BASE: u32 = 0x100;

fn link(
    queue: &InboundQueue,
    role: Role,
) -> Link<'_, ArrayMemory<256>, ScriptedTransport, ManualClock, FlagBoard> {
    Link::new(
        ArrayMemory::new(BASE),
        ScriptedTransport::new(),
        ManualClock::default(),
        FlagBoard::new(),
        role,
        queue,
        LinkConfig::default(),
    )
}

fn ack(mirror: u32, response: Response) -> Message {
    Message {
        command: Command::Notify,
        addr: WordAddr(mirror),
        data1: response.code(),
        data2: 0,
    }
}

#[test]
fn startup_broadcast_runs_to_started() {
    let queue = InboundQueue::new();
    let mut link = link(&queue, Role::Initiator);
    link.memory_mut().write_word(WordAddr(BASE), 0x1234);
    link.register(0, ObjKind::Scalar, WordAddr(BASE), 1, true).unwrap();
    link.map_peer(0, WordAddr(0x900)).unwrap();
    link.register(1, ObjKind::Scalar, WordAddr(BASE + 1), 1, false).unwrap();

    link.init(0).unwrap();
    link.flags_mut().raise_peer(Flag::ApiReady);

    // Handshake observed, then the broadcast pushes the startup object.
    link.run_once();
    assert_eq!(link.app_state(), AppState::StartupBroadcast);
    link.run_once();
    assert_eq!(link.state_of(0), ObjState::AwaitingResponse);
    assert_eq!(link.state_of(1), ObjState::Idle);
    assert!(!link.started());

    queue.push(ack(0x900, Response::DataWrite)).unwrap();
    link.run_once();
    assert_eq!(link.state_of(0), ObjState::Idle);
    assert!(link.started());
    assert!(link.flags_mut().local(Flag::AppStarted));
}

#[test]
fn exhausted_staging_parks_a_startup_block_and_holds_the_broadcast() {
    let queue = InboundQueue::new();
    let mut link = link(&queue, Role::Initiator);
    link.register(0, ObjKind::Block, WordAddr(BASE), 128, true).unwrap();
    link.map_peer(0, WordAddr(0x900)).unwrap();
    // Leave less free staging than the block needs.
    link.reserve_staging((STAGING_WORDS - 100) as u16).unwrap();
    let free_before = link.staging_free();
    assert!(free_before < 128);

    link.init(0).unwrap();
    link.flags_mut().raise_peer(Flag::ApiReady);

    // Every retry and every re-armed startup attempt runs out of space.
    for _ in 0..64 {
        link.run_once();
        link.clock().advance(LinkConfig::default().retry_window);
    }
    assert_eq!(link.state_of(0), ObjState::Fail);
    assert!(link.last_error(0));
    assert_eq!(link.app_state(), AppState::StartupBroadcast);
    assert!(!link.started());
    // Failed attempts never leak staging space.
    assert_eq!(link.staging_free(), free_before);
    assert!(link.transport_mut().calls().is_empty());
}

#[test]
fn acknowledged_block_returns_to_idle_and_releases_its_stage() {
    let queue = InboundQueue::new();
    let mut link = link(&queue, Role::Initiator);
    for off in 0..32 {
        link.memory_mut().write_word(WordAddr(BASE + 16 + off), off as u16);
    }
    link.register(1, ObjKind::Block, WordAddr(BASE + 16), 32, false).unwrap();
    link.map_peer(1, WordAddr(0x910)).unwrap();

    link.init(0).unwrap();
    link.flags_mut().raise_peer(Flag::ApiReady);
    link.run_once();
    link.run_once();
    assert!(link.started());

    let free_before = link.staging_free();
    link.request_send(1).unwrap();
    link.run_once();
    assert_eq!(link.state_of(1), ObjState::AwaitingResponse);
    // The stage stays reserved until the peer acknowledges.
    assert_eq!(link.staging_free(), free_before - 32);

    use corelink_hal::loopback::Call;
    let default = LinkConfig::default();
    assert_eq!(
        link.transport_mut().calls(),
        &[Call::Block {
            dest: WordAddr(0x910),
            src: WordAddr(default.staging_base),
            words: 32,
        }]
    );

    queue.push(ack(0x910, Response::BlockWrite)).unwrap();
    link.run_once();
    assert_eq!(link.state_of(1), ObjState::Idle);
    assert_eq!(link.staging_free(), free_before);
    assert!(!link.last_error(1));
}

#[test]
fn send_request_is_refused_while_a_transfer_is_outstanding() {
    let queue = InboundQueue::new();
    let mut link = link(&queue, Role::Initiator);
    link.memory_mut().write_word(WordAddr(BASE + 2), 7);
    link.register(2, ObjKind::Scalar, WordAddr(BASE + 2), 1, false).unwrap();
    link.map_peer(2, WordAddr(0x902)).unwrap();

    link.init(0).unwrap();
    link.flags_mut().raise_peer(Flag::ApiReady);
    link.run_once();
    link.run_once();
    assert!(link.started());
    assert_eq!(link.state_of(2), ObjState::Idle);

    link.request_send(2).unwrap();
    link.run_once();
    assert_eq!(link.state_of(2), ObjState::AwaitingResponse);

    // A second request must not restart the write or touch its timer.
    assert_eq!(link.request_send(2), Err(Error::NotReady));
    link.run_once();
    assert_eq!(link.transport_mut().calls().len(), 1);

    queue.push(ack(0x902, Response::DataWrite)).unwrap();
    link.run_once();
    assert_eq!(link.state_of(2), ObjState::Idle);
}

#[test]
fn pumped_peer_command_is_applied_and_acknowledged() {
    let queue = InboundQueue::new();
    let mut link = link(&queue, Role::Responder);
    let write = Message {
        command: Command::DataWrite,
        addr: WordAddr(BASE + 4),
        data1: 42,
        data2: 0,
    };
    link.transport_mut().push_inbound(write);

    assert_eq!(isr::pump(link.transport_mut(), &queue), 1);
    link.run_once();

    assert_eq!(link.transport_mut().applied(), &[write]);
    assert_eq!(link.inbound_drops(), 0);
}

#[test]
fn function_call_sends_the_stored_argument() {
    let queue = InboundQueue::new();
    let mut link = link(&queue, Role::Initiator);
    link.register(3, ObjKind::FunctionCall, WordAddr(BASE + 3), 1, false).unwrap();
    link.map_peer(3, WordAddr(0x903)).unwrap();
    link.set_argument(3, 0xDEAD_BEEF).unwrap();

    link.init(0).unwrap();
    link.flags_mut().raise_peer(Flag::ApiReady);
    link.run_once();
    link.run_once();
    link.request_send(3).unwrap();
    link.run_once();

    use corelink_hal::loopback::Call;
    assert_eq!(
        link.transport_mut().calls(),
        &[Call::Invoke { dest: WordAddr(0x903), argument: 0xDEAD_BEEF }]
    );

    queue.push(ack(0x903, Response::FunctionCall)).unwrap();
    link.run_once();
    assert_eq!(link.state_of(3), ObjState::Idle);
}

mod timeout_properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // The response window is measured in elapsed ticks, regardless of
        // where the free-running counter happens to sit when the write lands.
        #[test]
        fn response_timeout_fires_on_elapsed_ticks_at_any_counter_value(start in any::<u64>()) {
            let window = LinkConfig::default().response_window;
            let queue = InboundQueue::new();
            let mut link = Link::new(
                ArrayMemory::<16>::new(BASE),
                ScriptedTransport::new(),
                ManualClock::starting_at(start),
                FlagBoard::new(),
                Role::Initiator,
                &queue,
                LinkConfig::default(),
            );
            link.register(0, ObjKind::Scalar, WordAddr(BASE), 1, false).unwrap();
            link.map_peer(0, WordAddr(0x900)).unwrap();
            link.init(0).unwrap();
            link.flags_mut().raise_peer(Flag::ApiReady);
            link.run_once();
            link.run_once();
            link.request_send(0).unwrap();
            link.run_once();
            prop_assert_eq!(link.state_of(0), ObjState::AwaitingResponse);

            link.clock().advance(window - 1);
            link.run_once();
            prop_assert_eq!(link.state_of(0), ObjState::AwaitingResponse);

            link.clock().advance(1);
            link.run_once();
            prop_assert_eq!(link.state_of(0), ObjState::Retry);
        }
    }
}
