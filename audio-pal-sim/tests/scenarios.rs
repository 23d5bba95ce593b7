//! End-to-end scenarios over the in-memory back-end.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use audio_pal_core::{
    DeviceId, DrainType, GlobalCallback, GlobalEvent, GlobalParam, Pal, PalConfig, PalDevice,
    PalError, ParamId, PolicyAction, ResourceManager, Stream, StreamAttributes, StreamCallback,
    StreamClass, StreamDirection, StreamEvent, StreamHandle, StreamId, StreamType,
};
use audio_pal_sim::{ManualMonitor, MemorySessionFactory, SessionOp, SessionPhase, INJECTED_FAULT};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Rig {
    pal: Pal,
    factory: Arc<MemorySessionFactory>,
    monitor: ManualMonitor,
}

fn rig() -> Rig {
    init_logging();
    let factory = Arc::new(MemorySessionFactory::new());
    let monitor = ManualMonitor::new();
    let manager = ResourceManager::new(
        &PalConfig::default(),
        factory.clone(),
        Box::new(monitor.clone()),
    )
    .unwrap();
    let manager = Arc::new(manager);
    manager.init().unwrap();
    Rig {
        pal: Pal::from_manager(manager),
        factory,
        monitor,
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(GlobalEvent, u64)>>,
}

impl Recorder {
    fn events(&self) -> Vec<(GlobalEvent, u64)> {
        self.events.lock().clone()
    }
}

impl GlobalCallback for Recorder {
    fn on_global_event(&self, event: &GlobalEvent, cookie: u64) {
        self.events.lock().push((event.clone(), cookie));
    }
}

fn attrs(stream_type: StreamType, direction: StreamDirection) -> StreamAttributes {
    StreamAttributes::new(stream_type, direction)
}

fn devices(ids: &[DeviceId]) -> Vec<PalDevice> {
    ids.iter().copied().map(PalDevice::new).collect()
}

fn open(rig: &Rig, stream_type: StreamType, direction: StreamDirection, ids: &[DeviceId]) -> StreamHandle {
    rig.pal
        .stream_open(Some(&attrs(stream_type, direction)), &devices(ids), &[], None)
        .unwrap()
}

#[test]
fn channel_hint_bounds_hold_for_every_device() {
    let rig = rig();
    let manager = rig.pal.manager();
    for id in DeviceId::ALL {
        let stream_type = if id.direction() == StreamDirection::Output {
            StreamType::DeepBuffer
        } else {
            StreamType::VoipTx
        };
        let attributes = attrs(stream_type, id.direction());
        let max = manager.get_device_info(id, stream_type).unwrap().max_channels;
        let mut device = PalDevice::new(id);

        for bad in [0, max + 1] {
            let err = manager.get_device_config(&mut device, &attributes, bad).unwrap_err();
            assert!(err.is_device_config(), "{:?} accepted {} channels", id, bad);
        }
        manager.get_device_config(&mut device, &attributes, max).unwrap();
        assert_eq!(device.config.channels, max);
    }
}

#[test]
fn counts_track_started_streams_through_a_mixed_sequence() {
    let rig = rig();
    let manager = Arc::clone(rig.pal.manager());
    let plan = [
        (StreamType::LowLatency, StreamDirection::Output, DeviceId::Speaker),
        (StreamType::LowLatency, StreamDirection::Output, DeviceId::WiredHeadset),
        (StreamType::DeepBuffer, StreamDirection::Output, DeviceId::Speaker),
        (StreamType::Raw, StreamDirection::Input, DeviceId::HandsetMic),
        (StreamType::Raw, StreamDirection::Input, DeviceId::SpeakerMic),
    ];
    let handles: Vec<_> = plan
        .iter()
        .map(|(t, d, id)| (StreamClass::new(*t, *d), open(&rig, *t, *d, &[*id])))
        .collect();

    // Index into `handles`, then whether to start (true) or stop it.
    let script = [
        (0, true), (1, true), (3, true), (0, false), (2, true), (4, true),
        (3, false), (0, true), (1, false), (4, false), (2, false), (0, false),
    ];
    let mut active = vec![false; handles.len()];
    for (index, start) in script {
        let (_, handle) = handles[index];
        if start {
            rig.pal.stream_start(handle).unwrap();
        } else {
            rig.pal.stream_stop(handle).unwrap();
        }
        active[index] = start;

        let mut expected: BTreeMap<StreamClass, u32> = BTreeMap::new();
        for ((class, _), on) in handles.iter().zip(&active) {
            if *on {
                *expected.entry(*class).or_default() += 1;
            }
        }
        assert_eq!(manager.concurrency_snapshot(), expected);
    }
    assert!(manager.concurrency_snapshot().is_empty());
}

#[test]
fn failed_session_stop_still_releases_the_count() {
    let rig = rig();
    let class = StreamClass::new(StreamType::LowLatency, StreamDirection::Output);
    let handle = open(&rig, StreamType::LowLatency, StreamDirection::Output, &[DeviceId::Speaker]);
    rig.pal.stream_start(handle).unwrap();
    assert_eq!(rig.pal.manager().active_count(class), 1);

    rig.factory.faults().fail_once(SessionOp::Stop);
    let err = rig.pal.stream_stop(handle).unwrap_err();
    assert_eq!(err.status(), INJECTED_FAULT);
    assert_eq!(rig.pal.manager().active_count(class), 0);

    // The stream is stopped from the caller's view and can start again.
    rig.pal.stream_start(handle).unwrap();
    assert_eq!(rig.pal.manager().active_count(class), 1);
}

#[test]
fn switch_with_a_disconnected_device_keeps_the_old_routing() {
    let rig = rig();
    let payload = GlobalParam::DeviceConnection {
        device: DeviceId::WiredHeadset,
        connected: false,
    }
    .encode();
    rig.pal.set_param(ParamId::DeviceConnection.raw(), &payload).unwrap();

    let handle = open(&rig, StreamType::LowLatency, StreamDirection::Output, &[DeviceId::Speaker]);
    rig.pal.stream_start(handle).unwrap();
    let view = rig.factory.last_session().unwrap();

    let err = rig
        .pal
        .stream_set_device(handle, &devices(&[DeviceId::BluetoothA2dp, DeviceId::WiredHeadset]))
        .unwrap_err();
    assert!(err.is_device_config());
    assert_eq!(view.connected(), vec![DeviceId::Speaker]);
    assert_eq!(rig.pal.stream_write(handle, &[1, 2, 3, 4]).unwrap(), 4);
}

#[test]
fn refused_connection_rolls_back_to_the_old_routing() {
    let rig = rig();
    let handle = open(&rig, StreamType::LowLatency, StreamDirection::Output, &[DeviceId::Speaker]);
    rig.factory.faults().refuse_device(DeviceId::UsbDevice);

    let err = rig
        .pal
        .stream_set_device(handle, &devices(&[DeviceId::UsbDevice]))
        .unwrap_err();
    assert!(matches!(err, PalError::Session(_)));
    assert_eq!(rig.factory.last_session().unwrap().connected(), vec![DeviceId::Speaker]);

    rig.factory.faults().heal();
    rig.pal
        .stream_set_device(handle, &devices(&[DeviceId::UsbDevice]))
        .unwrap();
    assert_eq!(rig.factory.last_session().unwrap().connected(), vec![DeviceId::UsbDevice]);
}

#[test]
fn refused_rollback_leaves_the_stream_unrouted_until_the_next_switch() {
    let rig = rig();
    let handle = open(&rig, StreamType::LowLatency, StreamDirection::Output, &[DeviceId::Speaker]);
    rig.factory.faults().refuse_device(DeviceId::WiredHeadset);
    rig.factory.faults().refuse_device(DeviceId::Speaker);

    assert!(rig
        .pal
        .stream_set_device(handle, &devices(&[DeviceId::WiredHeadset]))
        .is_err());
    let view = rig.factory.last_session().unwrap();
    assert!(view.connected().is_empty());

    rig.factory.faults().heal();
    rig.pal
        .stream_set_device(handle, &devices(&[DeviceId::WiredHeadset]))
        .unwrap();
    assert_eq!(view.connected(), vec![DeviceId::WiredHeadset]);
}

/// Stops its own stream when a full drain completes.
struct StopOnDrain {
    pal: Weak<Pal>,
    handle: Mutex<Option<StreamHandle>>,
    stopped: Mutex<Vec<bool>>,
}

impl StreamCallback for StopOnDrain {
    fn on_event(&self, _stream: StreamId, event: &StreamEvent) {
        if *event != StreamEvent::DrainReady {
            return;
        }
        let handle = *self.handle.lock();
        if let (Some(pal), Some(handle)) = (self.pal.upgrade(), handle) {
            self.stopped.lock().push(pal.stream_stop(handle).is_ok());
        }
    }
}

#[test]
fn drain_callback_can_stop_its_own_stream() {
    let rig = rig();
    let pal = Arc::new(Pal::from_manager(Arc::clone(rig.pal.manager())));
    let callback = Arc::new(StopOnDrain {
        pal: Arc::downgrade(&pal),
        handle: Mutex::new(None),
        stopped: Mutex::new(Vec::new()),
    });
    let handle = pal
        .stream_open(
            Some(&attrs(StreamType::DeepBuffer, StreamDirection::Output)),
            &devices(&[DeviceId::Speaker]),
            &[],
            Some(callback.clone()),
        )
        .unwrap();
    *callback.handle.lock() = Some(handle);
    pal.stream_start(handle).unwrap();
    pal.stream_write(handle, &[0; 64]).unwrap();

    let (tx, rx) = mpsc::channel();
    let draining = Arc::clone(&pal);
    thread::spawn(move || {
        let _ = tx.send(draining.stream_drain(handle, DrainType::Full).is_ok());
    });
    assert!(rx.recv_timeout(Duration::from_secs(5)).expect("drain did not return"));

    assert_eq!(*callback.stopped.lock(), vec![true]);
    let class = StreamClass::new(StreamType::DeepBuffer, StreamDirection::Output);
    assert_eq!(pal.manager().active_count(class), 0);
    pal.stream_close(handle).unwrap();
}

#[test]
fn newest_global_callback_replaces_the_previous_one() {
    let rig = rig();
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    let first_dyn: Arc<dyn GlobalCallback> = first.clone();
    let second_dyn: Arc<dyn GlobalCallback> = second.clone();
    rig.pal.register_global_callback(&first_dyn, 1);
    rig.pal.register_global_callback(&second_dyn, 2);

    rig.monitor.set_online(false);
    rig.monitor.set_online(true);

    assert!(first.events().is_empty());
    assert_eq!(
        second.events(),
        vec![
            (GlobalEvent::SoundCardState { online: false }, 2),
            (GlobalEvent::SoundCardState { online: true }, 2),
        ]
    );
}

#[test]
fn voice_call_suspends_concurrent_raw_capture() {
    let rig = rig();
    let recorder = Arc::new(Recorder::default());
    let callback: Arc<dyn GlobalCallback> = recorder.clone();
    rig.pal.register_global_callback(&callback, 9);

    let call_class = StreamClass::new(StreamType::VoiceCall, StreamDirection::Bidirectional);
    let raw_class = StreamClass::new(StreamType::Raw, StreamDirection::Input);

    let call = open(
        &rig,
        StreamType::VoiceCall,
        StreamDirection::Bidirectional,
        &[DeviceId::Handset, DeviceId::HandsetMic],
    );
    rig.pal.stream_start(call).unwrap();

    let raw = open(&rig, StreamType::Raw, StreamDirection::Input, &[DeviceId::SpeakerMic]);
    rig.pal.stream_start(raw).unwrap();
    let raw_view = rig.factory.last_session().unwrap();

    let manager = rig.pal.manager();
    assert_eq!(manager.active_count(call_class), 1);
    assert_eq!(manager.active_count(raw_class), 1);
    assert!(raw_view.is_paused());

    let decisions: Vec<_> = recorder
        .events()
        .into_iter()
        .filter_map(|(event, cookie)| match event {
            GlobalEvent::PolicyApplied(decision) => Some((decision, cookie)),
            _ => None,
        })
        .collect();
    assert_eq!(decisions.len(), 1);
    let (decision, cookie) = decisions[0];
    assert_eq!(cookie, 9);
    assert_eq!(decision.class, raw_class);
    assert_eq!(decision.action, PolicyAction::Suspend);
    assert!(decision.engaged);

    rig.pal.stream_stop(call).unwrap();
    assert!(!raw_view.is_paused());
    let mut buf = [0u8; 16];
    assert_eq!(rig.pal.stream_read(raw, &mut buf).unwrap(), 16);
}

#[test]
fn open_without_attributes_allocates_no_session() {
    let rig = rig();
    let err = rig
        .pal
        .stream_open(None, &devices(&[DeviceId::Speaker]), &[], None)
        .unwrap_err();
    assert!(err.is_invalid_argument());
    assert!(rig.factory.sessions().is_empty());
    assert_eq!(rig.pal.open_streams(), 0);
}

#[test]
fn closing_twice_never_double_frees() {
    let rig = rig();
    let manager = rig.pal.manager();
    let stream = Stream::create(
        manager,
        Some(&attrs(StreamType::LowLatency, StreamDirection::Output)),
        &devices(&[DeviceId::Speaker]),
        &[],
    )
    .unwrap();
    stream.open().unwrap();
    stream.start().unwrap();
    stream.close().unwrap();
    assert!(stream.close().unwrap_err().is_invalid_state());
    assert_eq!(rig.factory.last_session().unwrap().phase(), SessionPhase::Closed);

    let handle = open(&rig, StreamType::LowLatency, StreamDirection::Output, &[DeviceId::Speaker]);
    rig.pal.stream_close(handle).unwrap();
    assert!(rig.pal.stream_close(handle).unwrap_err().is_invalid_argument());
    assert_eq!(rig.factory.live_sessions(), 0);
}

#[test]
fn failed_open_leaves_no_live_session() {
    let rig = rig();
    rig.factory.faults().fail_once(SessionOp::SetConfig);
    let result = rig.pal.stream_open(
        Some(&attrs(StreamType::LowLatency, StreamDirection::Output)),
        &devices(&[DeviceId::Speaker]),
        &[],
        None,
    );
    assert!(result.is_err());
    assert_eq!(rig.factory.live_sessions(), 0);
    assert_eq!(rig.pal.manager().stream_count(), 0);
}

#[test]
fn offline_card_refuses_new_streams() {
    let rig = rig();
    rig.monitor.set_online(false);
    let err = rig
        .pal
        .stream_open(
            Some(&attrs(StreamType::LowLatency, StreamDirection::Output)),
            &devices(&[DeviceId::Speaker]),
            &[],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, PalError::ResourceUnavailable(_)));
    assert_eq!(rig.factory.live_sessions(), 0);

    rig.monitor.set_online(true);
    open(&rig, StreamType::LowLatency, StreamDirection::Output, &[DeviceId::Speaker]);
}

#[test]
fn voice_ui_follows_the_global_capture_device() {
    let rig = rig();
    let handle = open(&rig, StreamType::VoiceUi, StreamDirection::Input, &[DeviceId::HandsetVaMic]);
    let view = rig.factory.last_session().unwrap();

    // Per-stream switching is ignored for voice UI.
    rig.pal
        .stream_set_device(handle, &devices(&[DeviceId::WiredHeadsetMic]))
        .unwrap();
    assert_eq!(view.connected(), vec![DeviceId::HandsetVaMic]);

    let payload = GlobalParam::VoiceUiCaptureDevice(DeviceId::WiredHeadsetMic).encode();
    rig.pal.set_param(ParamId::VoiceUiCaptureDevice.raw(), &payload).unwrap();
    assert_eq!(view.connected(), vec![DeviceId::WiredHeadsetMic]);
    assert_eq!(rig.pal.get_param(ParamId::VoiceUiCaptureDevice.raw()).unwrap(), payload);
}

#[test]
fn concurrent_clients_leave_consistent_counts() {
    let rig = rig();
    let manager = Arc::clone(rig.pal.manager());
    let class = StreamClass::new(StreamType::LowLatency, StreamDirection::Output);
    let handles: Vec<_> = (0..8)
        .map(|_| open(&rig, StreamType::LowLatency, StreamDirection::Output, &[DeviceId::Speaker]))
        .collect();
    let call = StreamClass::new(StreamType::VoiceCall, StreamDirection::Bidirectional);

    thread::scope(|scope| {
        for (i, handle) in handles.iter().enumerate() {
            let pal = &rig.pal;
            scope.spawn(move || {
                for round in 0..50 {
                    pal.stream_start(*handle).unwrap();
                    if (i + round) % 3 == 0 {
                        let target = if round % 2 == 0 {
                            DeviceId::WiredHeadset
                        } else {
                            DeviceId::Speaker
                        };
                        pal.stream_set_device(*handle, &devices(&[target])).unwrap();
                    }
                    pal.stream_stop(*handle).unwrap();
                }
            });
        }
        let manager = &manager;
        scope.spawn(move || {
            for _ in 0..50 {
                manager.concurrent_stream_status(call, true);
                manager.concurrent_stream_status(call, false);
            }
        });
    });

    assert_eq!(manager.active_count(class), 0);
    assert_eq!(manager.active_count(call), 0);
    for handle in handles {
        rig.pal.stream_close(handle).unwrap();
    }
    assert_eq!(manager.stream_count(), 0);
}

#[test]
fn process_wide_instance_round_trip() {
    init_logging();
    let factory = Arc::new(MemorySessionFactory::new());
    let pal = Pal::init(|| {
        ResourceManager::new(&PalConfig::default(), factory.clone(), Box::new(ManualMonitor::new()))
    })
    .unwrap();
    assert!(pal.manager().is_initialized());

    let again = Pal::init(|| unreachable!("manager already installed")).unwrap();
    assert!(Arc::ptr_eq(pal.manager(), again.manager()));

    pal.deinit();
    assert!(audio_pal_core::manager::instance::get_instance().is_err());
}
