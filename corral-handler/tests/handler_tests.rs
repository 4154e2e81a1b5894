use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use corral_cgroup::{CgroupConfig, GroupBackend, MockBackend};
use corral_core::*;
use corral_handler::*;

const POLL: Duration = Duration::from_millis(10);

type Delivery = std::result::Result<(), ErrorKind>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("corral_handler=debug,corral_cgroup=debug")
        .with_test_writer()
        .try_init();
}

async fn setup() -> (Arc<MockBackend>, FactoryRegistry) {
    init_tracing();
    let backend = Arc::new(MockBackend::new());
    let config = CgroupConfig::default().with_poll_interval(POLL);
    let registry = FactoryRegistry::with_backend(backend.clone(), &config);
    registry.init_machine(&InitSpec::default()).await.unwrap();
    (backend, registry)
}

fn name(s: &str) -> ContainerName {
    ContainerName::new(s).unwrap()
}

fn memory_spec(limit_mb: u64) -> ContainerSpec {
    ContainerSpec {
        memory: Some(MemorySpec {
            limit: Some(Limit::Value(MemorySize::from_mb(limit_mb))),
            ..Default::default()
        }),
        ..Default::default()
    }
}

async fn create(
    registry: &FactoryRegistry,
    resource: ResourceType,
    container: &str,
    spec: &ContainerSpec,
) -> Box<dyn ResourceHandler> {
    registry
        .factory(resource)
        .unwrap()
        .create(&name(container), spec)
        .await
        .unwrap()
}

async fn live_spec(handler: &dyn ResourceHandler) -> ContainerSpec {
    let mut spec = ContainerSpec::default();
    handler.spec(&mut spec).await.unwrap();
    spec
}

/// Callback forwarding every delivery to a channel
fn channel_callback() -> (NotificationCallback, mpsc::UnboundedReceiver<Delivery>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: NotificationCallback = Box::new(move |result: Result<()>| {
        let _ = tx.send(result.map_err(|e| e.kind()));
    });
    (callback, rx)
}

async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no notification delivered")
        .expect("channel closed")
}

async fn settle() {
    tokio::time::sleep(POLL * 5).await;
}

#[tokio::test]
async fn test_get_matches_created_handler() {
    let (_backend, registry) = setup().await;

    for resource in ResourceType::ALL {
        let factory = registry.factory(resource).unwrap();
        let created = factory
            .create(&name("/job"), &ContainerSpec::default())
            .await
            .unwrap();
        let attached = factory.get(&name("/job")).await.unwrap();

        assert_eq!(created.container_name(), attached.container_name());
        assert_eq!(created.resource_type(), resource);
        assert_eq!(attached.resource_type(), resource);
        assert_eq!(attached.state(), HandlerState::Active);
    }
}

#[tokio::test]
async fn test_get_unknown_container_is_not_found() {
    let (_backend, registry) = setup().await;

    let err = registry
        .factory(ResourceType::Cpu)
        .unwrap()
        .get(&name("/missing"))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_duplicate_create_is_already_exists() {
    let (_backend, registry) = setup().await;
    let factory = registry.factory(ResourceType::Memory).unwrap();

    let _first = factory.create(&name("/job"), &memory_spec(64)).await.unwrap();
    let err = factory
        .create(&name("/job"), &memory_spec(64))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
}

#[tokio::test]
async fn test_create_rejects_malformed_section_before_writing() {
    let (backend, registry) = setup().await;
    let spec = ContainerSpec {
        memory: Some(MemorySpec {
            limit: Some(Limit::Value(MemorySize::from_mb(64))),
            reservation: Some(MemorySize::from_mb(128)),
            swap_limit: None,
        }),
        ..Default::default()
    };

    let err = registry
        .factory(ResourceType::Memory)
        .unwrap()
        .create(&name("/job"), &spec)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(!backend.group_exists(ResourceType::Memory, &name("/job")).await.unwrap());
}

#[tokio::test]
async fn test_create_ignores_other_sections() {
    let (backend, registry) = setup().await;
    let spec = ContainerSpec {
        cpu: Some(CpuSpec {
            limit: Some(Limit::Value(CpuCores::new(0.5))),
            weight: None,
        }),
        ..memory_spec(128)
    };

    let cpu = create(&registry, ResourceType::Cpu, "/job", &spec).await;
    let live = live_spec(cpu.as_ref()).await;

    assert!(live.memory.is_none());
    assert_eq!(live.cpu.unwrap().limit, Some(Limit::Value(CpuCores::new(0.5))));
    let memory_limit = backend
        .read(ResourceType::Memory, &ContainerName::root(), "memory.max")
        .await
        .unwrap();
    assert_eq!(memory_limit, "max");
}

#[tokio::test]
async fn test_failed_create_rolls_back_group() {
    let (backend, registry) = setup().await;
    backend.fail_writes_to("pids.max").await;
    let spec = ContainerSpec {
        global: Some(GlobalSpec {
            max_tasks: Some(Limit::Value(32)),
            frozen: None,
        }),
        ..Default::default()
    };

    let err = registry
        .factory(ResourceType::Global)
        .unwrap()
        .create(&name("/job"), &spec)
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(!backend.group_exists(ResourceType::Global, &name("/job")).await.unwrap());
}

#[tokio::test]
async fn test_memory_job_lifecycle() {
    let (_backend, registry) = setup().await;
    let _batch = create(&registry, ResourceType::Memory, "/batch", &ContainerSpec::default()).await;

    let mut job = create(&registry, ResourceType::Memory, "/batch/job1", &memory_spec(256)).await;
    assert_eq!(job.state(), HandlerState::Active);

    let mut stats = ContainerStats::default();
    job.stats(StatsType::Summary, &mut stats).await.unwrap();
    assert!(stats.memory.unwrap().usage <= MemorySize::from_mb(256));

    let before = live_spec(job.as_ref()).await.memory.unwrap();
    job.update(&memory_spec(512), UpdatePolicy::Diff).await.unwrap();
    let after = live_spec(job.as_ref()).await.memory.unwrap();

    assert_eq!(after.limit, Some(Limit::Value(MemorySize::from_mb(512))));
    assert_eq!(after.reservation, before.reservation);
    assert_eq!(after.swap_limit, before.swap_limit);

    job.destroy().await.unwrap();
    assert_eq!(job.state(), HandlerState::Destroyed);

    let mut stats = ContainerStats::default();
    let err = job.stats(StatsType::Summary, &mut stats).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert!(stats.memory.is_none());
}

#[tokio::test]
async fn test_diff_leaves_absent_fields_untouched() {
    let (_backend, registry) = setup().await;
    let spec = ContainerSpec {
        cpu: Some(CpuSpec {
            limit: Some(Limit::Value(CpuCores::new(2.0))),
            weight: Some(300),
        }),
        ..Default::default()
    };
    let mut cpu = create(&registry, ResourceType::Cpu, "/job", &spec).await;

    let weight_only = ContainerSpec {
        cpu: Some(CpuSpec {
            limit: None,
            weight: Some(50),
        }),
        ..Default::default()
    };
    cpu.update(&weight_only, UpdatePolicy::Diff).await.unwrap();

    let live = live_spec(cpu.as_ref()).await.cpu.unwrap();
    assert_eq!(live.limit, Some(Limit::Value(CpuCores::new(2.0))));
    assert_eq!(live.weight, Some(50));

    // no section, nothing to do
    cpu.update(&ContainerSpec::default(), UpdatePolicy::Diff)
        .await
        .unwrap();
    assert_eq!(live_spec(cpu.as_ref()).await.cpu.unwrap(), live);
}

#[tokio::test]
async fn test_replace_resets_unmentioned_fields() {
    let (_backend, registry) = setup().await;
    let spec = ContainerSpec {
        memory: Some(MemorySpec {
            limit: Some(Limit::Value(MemorySize::from_mb(256))),
            reservation: Some(MemorySize::from_mb(64)),
            swap_limit: Some(Limit::Value(MemorySize::from_mb(128))),
        }),
        ..Default::default()
    };
    let mut memory = create(&registry, ResourceType::Memory, "/job", &spec).await;

    memory
        .update(&memory_spec(512), UpdatePolicy::Replace)
        .await
        .unwrap();

    let live = live_spec(memory.as_ref()).await.memory.unwrap();
    assert_eq!(live.limit, Some(Limit::Value(MemorySize::from_mb(512))));
    assert_eq!(live.reservation, Some(MemorySize::default()));
    assert_eq!(live.swap_limit, Some(Limit::Max));

    // an absent section resets everything
    memory
        .update(&ContainerSpec::default(), UpdatePolicy::Replace)
        .await
        .unwrap();
    let live = live_spec(memory.as_ref()).await.memory.unwrap();
    assert_eq!(live, MemorySpec::default().with_defaults());
}

#[tokio::test]
async fn test_replace_is_idempotent_for_every_resource() {
    let (_backend, registry) = setup().await;
    let spec = ContainerSpec {
        cpu: Some(CpuSpec {
            limit: Some(Limit::Value(CpuCores::new(1.5))),
            weight: None,
        }),
        memory: memory_spec(256).memory,
        diskio: Some(DiskIoSpec {
            weight: Some(500),
            device_limits: Some(vec![DeviceLimit {
                major: 8,
                minor: 0,
                read_bps: Limit::Value(1_048_576),
                write_bps: Limit::Max,
            }]),
        }),
        network: Some(NetworkSpec {
            class_id: Some(0x0010_0001),
            priorities: Some(BTreeMap::from([("eth0".to_string(), 5)])),
        }),
        monitoring: Some(MonitoringSpec {
            pressure: Some(false),
        }),
        global: Some(GlobalSpec {
            max_tasks: Some(Limit::Value(128)),
            frozen: None,
        }),
    };

    for resource in ResourceType::ALL {
        let mut handler = create(&registry, resource, "/job", &ContainerSpec::default()).await;

        handler.update(&spec, UpdatePolicy::Replace).await.unwrap();
        let first = live_spec(handler.as_ref()).await;
        handler.update(&spec, UpdatePolicy::Replace).await.unwrap();
        let second = live_spec(handler.as_ref()).await;

        assert_eq!(first, second, "{resource} replace is not idempotent");
        assert_eq!(first.present(), vec![resource]);
    }
}

#[tokio::test]
async fn test_replace_drops_stale_device_and_interface_entries() {
    let (_backend, registry) = setup().await;
    let initial = ContainerSpec {
        diskio: Some(DiskIoSpec {
            weight: None,
            device_limits: Some(vec![
                DeviceLimit {
                    major: 8,
                    minor: 0,
                    read_bps: Limit::Value(1000),
                    write_bps: Limit::Max,
                },
                DeviceLimit {
                    major: 8,
                    minor: 16,
                    read_bps: Limit::Max,
                    write_bps: Limit::Value(2000),
                },
            ]),
        }),
        network: Some(NetworkSpec {
            class_id: None,
            priorities: Some(BTreeMap::from([
                ("eth0".to_string(), 5),
                ("eth1".to_string(), 7),
            ])),
        }),
        ..Default::default()
    };
    let target = ContainerSpec {
        diskio: Some(DiskIoSpec {
            weight: None,
            device_limits: Some(vec![DeviceLimit {
                major: 8,
                minor: 16,
                read_bps: Limit::Max,
                write_bps: Limit::Value(4000),
            }]),
        }),
        network: Some(NetworkSpec {
            class_id: None,
            priorities: Some(BTreeMap::from([("eth1".to_string(), 1)])),
        }),
        ..Default::default()
    };

    let mut diskio = create(&registry, ResourceType::DiskIo, "/job", &initial).await;
    diskio.update(&target, UpdatePolicy::Replace).await.unwrap();
    let live = live_spec(diskio.as_ref()).await.diskio.unwrap();
    assert_eq!(live.device_limits, target.diskio.as_ref().unwrap().device_limits);

    let mut network = create(&registry, ResourceType::Network, "/job", &initial).await;
    network.update(&target, UpdatePolicy::Replace).await.unwrap();
    let live = live_spec(network.as_ref()).await.network.unwrap();
    assert_eq!(live.priorities, target.network.unwrap().priorities);
}

#[tokio::test]
async fn test_failed_write_skips_only_dependent_knobs() {
    let (backend, registry) = setup().await;
    let mut memory = create(&registry, ResourceType::Memory, "/job", &ContainerSpec::default()).await;
    backend.fail_writes_to("memory.max").await;

    let update = ContainerSpec {
        memory: Some(MemorySpec {
            limit: Some(Limit::Value(MemorySize::from_mb(512))),
            reservation: Some(MemorySize::from_mb(128)),
            swap_limit: Some(Limit::Value(MemorySize::from_mb(1024))),
        }),
        ..Default::default()
    };
    let err = memory.update(&update, UpdatePolicy::Diff).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(err.to_string().contains("memory.max"));

    let live = live_spec(memory.as_ref()).await.memory.unwrap();
    assert_eq!(live.limit, Some(Limit::Max));
    assert_eq!(live.reservation, Some(MemorySize::default()));
    assert_eq!(live.swap_limit, Some(Limit::Value(MemorySize::from_mb(1024))));
    assert_eq!(memory.state(), HandlerState::Active);
}

#[tokio::test]
async fn test_enter_stops_at_first_failure() {
    let (backend, registry) = setup().await;
    let memory = create(&registry, ResourceType::Memory, "/job", &ContainerSpec::default()).await;

    let t1 = ThreadId::from_raw(101);
    let t2 = ThreadId::from_raw(102);
    let t3 = ThreadId::from_raw(103);
    backend.reject_thread(t2).await;

    let err = memory.enter(&[t1, t2, t3]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("102"));

    let job = name("/job");
    assert!(backend.has_thread(ResourceType::Memory, &job, t1).await);
    assert!(!backend.has_thread(ResourceType::Memory, &job, t2).await);
    assert!(!backend.has_thread(ResourceType::Memory, &job, t3).await);
}

#[tokio::test]
async fn test_full_stats_report_threads_and_breakdowns() {
    let (_backend, registry) = setup().await;
    let global = create(&registry, ResourceType::Global, "/job", &ContainerSpec::default()).await;
    let cpu = create(&registry, ResourceType::Cpu, "/job", &ContainerSpec::default()).await;
    let tids = [ThreadId::from_raw(7), ThreadId::from_raw(8)];
    global.enter(&tids).await.unwrap();

    let mut summary = ContainerStats::default();
    global.stats(StatsType::Summary, &mut summary).await.unwrap();
    cpu.stats(StatsType::Summary, &mut summary).await.unwrap();
    let global_summary = summary.global.unwrap();
    assert_eq!(global_summary.tasks, 2);
    assert!(global_summary.populated);
    assert!(global_summary.threads.is_empty());
    assert!(summary.cpu.unwrap().user.is_none());

    let mut full = ContainerStats::default();
    global.stats(StatsType::Full, &mut full).await.unwrap();
    cpu.stats(StatsType::Full, &mut full).await.unwrap();
    assert_eq!(full.global.unwrap().threads, tids.to_vec());
    assert_eq!(full.cpu.unwrap().user, Some(Duration::ZERO));
    assert!(full.memory.is_none());
}

#[tokio::test]
async fn test_destroyed_handler_rejects_everything() {
    let (_backend, registry) = setup().await;
    let mut handler = create(&registry, ResourceType::Memory, "/job", &memory_spec(64)).await;
    handler.destroy().await.unwrap();

    let precondition = |r: Result<()>| assert_eq!(r.unwrap_err().kind(), ErrorKind::FailedPrecondition);

    precondition(handler.update(&memory_spec(128), UpdatePolicy::Diff).await);
    precondition(handler.stats(StatsType::Full, &mut ContainerStats::default()).await);
    precondition(handler.spec(&mut ContainerSpec::default()).await);
    precondition(handler.enter(&[ThreadId::from_raw(1)]).await);
    precondition(handler.create(&memory_spec(128)).await);
    precondition(handler.destroy().await);
    precondition(
        handler
            .unregister_notification(NotificationId::from_raw(1))
            .await,
    );

    let (callback, _rx) = channel_callback();
    let spec = EventSpec {
        oom: Some(OomEvent {}),
        ..Default::default()
    };
    let err = handler.register_notification(&spec, callback).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
}

#[tokio::test]
async fn test_failed_destroy_can_be_retried() {
    let (backend, registry) = setup().await;
    let mut memory = create(&registry, ResourceType::Memory, "/job", &ContainerSpec::default()).await;
    let job = name("/job");
    let spec = EventSpec {
        oom: Some(OomEvent {}),
        ..Default::default()
    };
    let (callback, mut rx) = channel_callback();
    memory.register_notification(&spec, callback).await.unwrap();
    settle().await;

    backend.fail_next_removals(1).await;
    let err = memory.destroy().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert_eq!(memory.state(), HandlerState::Active);
    assert_eq!(memory.active_notifications(), 1);

    // the subscription keeps delivering after the failed attempt
    backend
        .set_file(ResourceType::Memory, &job, "memory.events", "oom 1\noom_kill 1")
        .await;
    assert_eq!(next_delivery(&mut rx).await, Ok(()));

    memory.destroy().await.unwrap();
    assert_eq!(memory.state(), HandlerState::Destroyed);
    assert_eq!(memory.active_notifications(), 0);
    assert!(!backend.group_exists(ResourceType::Memory, &job).await.unwrap());
}

#[tokio::test]
async fn test_destroy_with_threads_is_precondition_failure() {
    let (backend, registry) = setup().await;
    let mut global = create(&registry, ResourceType::Global, "/job", &ContainerSpec::default()).await;
    let job = name("/job");
    global.enter(&[ThreadId::from_raw(55)]).await.unwrap();

    let spec = EventSpec {
        container_empty: Some(ContainerEmptyEvent {}),
        ..Default::default()
    };
    let (callback, mut rx) = channel_callback();
    global.register_notification(&spec, callback).await.unwrap();
    settle().await;

    let err = global.destroy().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(global.state(), HandlerState::Active);
    assert_eq!(global.active_notifications(), 1);

    // the empty watch still reports the drain that unblocks destroy
    backend.clear_threads(ResourceType::Global, &job).await;
    assert_eq!(next_delivery(&mut rx).await, Ok(()));

    global.destroy().await.unwrap();
    assert_eq!(global.active_notifications(), 0);
}

#[tokio::test]
async fn test_init_machine_is_idempotent() {
    let (backend, registry) = setup().await;
    let steps = backend.init_steps().await;
    assert_eq!(steps, ResourceType::ALL.len());

    registry.init_machine(&InitSpec::default()).await.unwrap();
    assert_eq!(backend.init_steps().await, steps);

    let conflicting = InitSpec {
        hierarchies: vec![HierarchySpec {
            resource: ResourceType::Memory,
            controllers: vec!["memory".to_string(), "hugetlb".to_string()],
        }],
    };
    let err = registry.init_machine(&conflicting).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FailedPrecondition);
    assert_eq!(backend.init_steps().await, steps);
}

#[tokio::test]
async fn test_multi_kind_event_spec_is_rejected() {
    let (_backend, registry) = setup().await;
    let mut memory = create(&registry, ResourceType::Memory, "/job", &ContainerSpec::default()).await;

    let spec = EventSpec {
        oom: Some(OomEvent {}),
        memory_threshold: Some(MemoryThresholdEvent {
            usage: MemorySize::from_mb(1),
        }),
        ..Default::default()
    };
    let (callback, _rx) = channel_callback();
    let err = memory.register_notification(&spec, callback).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(memory.active_notifications(), 0);

    let (callback, _rx) = channel_callback();
    let err = memory
        .register_notification(&EventSpec::default(), callback)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_unsupported_event_is_not_found() {
    let (_backend, registry) = setup().await;
    let mut cpu = create(&registry, ResourceType::Cpu, "/job", &ContainerSpec::default()).await;

    let spec = EventSpec {
        oom: Some(OomEvent {}),
        ..Default::default()
    };
    let (callback, _rx) = channel_callback();
    let err = cpu.register_notification(&spec, callback).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(cpu.active_notifications(), 0);
}

#[tokio::test]
async fn test_oom_notification_is_recurring() {
    let (backend, registry) = setup().await;
    let mut memory = create(&registry, ResourceType::Memory, "/job", &ContainerSpec::default()).await;
    let job = name("/job");

    let spec = EventSpec {
        oom: Some(OomEvent {}),
        ..Default::default()
    };
    let (callback, mut rx) = channel_callback();
    let id = memory.register_notification(&spec, callback).await.unwrap();
    assert_eq!(memory.active_notifications(), 1);
    settle().await;

    backend
        .set_file(ResourceType::Memory, &job, "memory.events", "oom 1\noom_kill 1")
        .await;
    assert_eq!(next_delivery(&mut rx).await, Ok(()));

    backend
        .set_file(ResourceType::Memory, &job, "memory.events", "oom 2\noom_kill 2")
        .await;
    assert_eq!(next_delivery(&mut rx).await, Ok(()));

    memory.unregister_notification(id).await.unwrap();
    assert_eq!(memory.active_notifications(), 0);

    let err = memory.unregister_notification(id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_zero_poll_interval_still_delivers() {
    init_tracing();
    let backend = Arc::new(MockBackend::new());
    let factory = MemoryHandlerFactory::new(backend.clone(), Duration::ZERO);
    factory.init_machine(&InitSpec::default()).await.unwrap();
    let job = name("/job");
    let mut memory = factory.create(&job, &ContainerSpec::default()).await.unwrap();

    let spec = EventSpec {
        oom: Some(OomEvent {}),
        ..Default::default()
    };
    let (callback, mut rx) = channel_callback();
    memory.register_notification(&spec, callback).await.unwrap();
    settle().await;

    backend
        .set_file(ResourceType::Memory, &job, "memory.events", "oom 1\noom_kill 1")
        .await;
    assert_eq!(next_delivery(&mut rx).await, Ok(()));

    memory.destroy().await.unwrap();
}

#[tokio::test]
async fn test_threshold_notification_rearms() {
    let (backend, registry) = setup().await;
    let mut memory = create(&registry, ResourceType::Memory, "/job", &ContainerSpec::default()).await;
    let job = name("/job");

    let spec = EventSpec {
        memory_threshold: Some(MemoryThresholdEvent {
            usage: MemorySize::from_mb(1),
        }),
        ..Default::default()
    };
    let (callback, mut rx) = channel_callback();
    memory.register_notification(&spec, callback).await.unwrap();
    settle().await;

    backend
        .set_file(ResourceType::Memory, &job, "memory.current", "2097152")
        .await;
    assert_eq!(next_delivery(&mut rx).await, Ok(()));

    settle().await;
    assert!(rx.try_recv().is_err());

    backend
        .set_file(ResourceType::Memory, &job, "memory.current", "0")
        .await;
    settle().await;
    backend
        .set_file(ResourceType::Memory, &job, "memory.current", "4194304")
        .await;
    assert_eq!(next_delivery(&mut rx).await, Ok(()));
}

#[tokio::test]
async fn test_container_empty_fires_once() {
    let (backend, registry) = setup().await;
    let mut global = create(&registry, ResourceType::Global, "/job", &ContainerSpec::default()).await;
    let job = name("/job");
    global.enter(&[ThreadId::from_raw(9)]).await.unwrap();

    let spec = EventSpec {
        container_empty: Some(ContainerEmptyEvent {}),
        ..Default::default()
    };
    let (callback, mut rx) = channel_callback();
    global.register_notification(&spec, callback).await.unwrap();
    settle().await;

    backend.clear_threads(ResourceType::Global, &job).await;
    assert_eq!(next_delivery(&mut rx).await, Ok(()));

    global.enter(&[ThreadId::from_raw(10)]).await.unwrap();
    settle().await;
    backend.clear_threads(ResourceType::Global, &job).await;
    settle().await;
    assert!(rx.try_recv().is_err());

    // finished subscriptions stay registered until removed
    assert_eq!(global.active_notifications(), 1);
}

#[tokio::test]
async fn test_pressure_notification() {
    let (backend, registry) = setup().await;
    let mut monitoring =
        create(&registry, ResourceType::Monitoring, "/job", &ContainerSpec::default()).await;
    let job = name("/job");

    let spec = EventSpec {
        pressure: Some(PressureEvent {
            resource: PressureResource::Memory,
            stall_us: 1000,
        }),
        ..Default::default()
    };
    let (callback, mut rx) = channel_callback();
    monitoring.register_notification(&spec, callback).await.unwrap();
    settle().await;

    backend
        .set_file(
            ResourceType::Monitoring,
            &job,
            "memory.pressure",
            "some avg10=5.00 avg60=1.00 avg300=0.20 total=50000\n\
             full avg10=1.00 avg60=0.50 avg300=0.10 total=10000",
        )
        .await;
    assert_eq!(next_delivery(&mut rx).await, Ok(()));
}

#[tokio::test]
async fn test_probe_failure_is_delivered_as_error() {
    let (backend, registry) = setup().await;
    let mut memory = create(&registry, ResourceType::Memory, "/job", &ContainerSpec::default()).await;

    let spec = EventSpec {
        oom: Some(OomEvent {}),
        ..Default::default()
    };
    let (callback, mut rx) = channel_callback();
    memory.register_notification(&spec, callback).await.unwrap();
    settle().await;

    backend
        .set_file(ResourceType::Memory, &name("/job"), "memory.events", "garbage")
        .await;
    assert_eq!(next_delivery(&mut rx).await, Err(ErrorKind::Internal));
}

#[tokio::test]
async fn test_callbacks_are_released_on_unregister_and_destroy() {
    let (_backend, registry) = setup().await;
    let mut memory = create(&registry, ResourceType::Memory, "/job", &ContainerSpec::default()).await;
    let marker = Arc::new(());
    let spec = EventSpec {
        oom: Some(OomEvent {}),
        ..Default::default()
    };

    let held = Arc::clone(&marker);
    let id = memory
        .register_notification(&spec, Box::new(move |_: Result<()>| drop(Arc::clone(&held))))
        .await
        .unwrap();
    assert_eq!(Arc::strong_count(&marker), 2);
    memory.unregister_notification(id).await.unwrap();
    assert_eq!(Arc::strong_count(&marker), 1);

    for _ in 0..3 {
        let held = Arc::clone(&marker);
        memory
            .register_notification(&spec, Box::new(move |_: Result<()>| drop(Arc::clone(&held))))
            .await
            .unwrap();
    }
    assert_eq!(Arc::strong_count(&marker), 4);

    memory.destroy().await.unwrap();
    assert_eq!(Arc::strong_count(&marker), 1);
    assert_eq!(memory.active_notifications(), 0);
}

#[tokio::test]
async fn test_handlers_run_in_parallel() {
    let (backend, registry) = setup().await;
    let registry = Arc::new(registry);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let container = format!("/job{i}");
            let mut handler = create(&registry, ResourceType::Memory, &container, &memory_spec(64)).await;
            handler
                .update(&memory_spec(128), UpdatePolicy::Diff)
                .await
                .unwrap();
            handler.destroy().await.unwrap();
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    for i in 0..8 {
        let container = name(&format!("/job{i}"));
        assert!(!backend.group_exists(ResourceType::Memory, &container).await.unwrap());
    }
}
