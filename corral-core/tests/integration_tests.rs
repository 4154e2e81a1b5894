use corral_core::*;

#[test]
fn test_container_name_validation() {
    // Valid names
    assert!(ContainerName::new("/").is_ok());
    assert!(ContainerName::new("/test").is_ok());
    assert!(ContainerName::new("/batch/job1").is_ok());
    assert!(ContainerName::new("/a/b/c/d").is_ok());
    assert!(ContainerName::new("/ABC-123_xyz.v2").is_ok());

    // Invalid names - not absolute
    assert!(ContainerName::new("").is_err());
    assert!(ContainerName::new("test").is_err());

    // Invalid names - bad components
    assert!(ContainerName::new("/test/").is_err());
    assert!(ContainerName::new("/./test").is_err());
    assert!(ContainerName::new("/test@123").is_err());
    assert!(ContainerName::new("/test space").is_err());
    assert!(ContainerName::new("/test\\path").is_err());
    assert!(ContainerName::new("/test:colon").is_err());
}

#[test]
fn test_invalid_names_report_invalid_argument() {
    let err = ContainerName::new("relative").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_full_spec_round_trip_through_json() {
    let spec = ContainerSpec {
        cpu: Some(CpuSpec {
            limit: Some(Limit::Value(CpuCores::new(1.5))),
            weight: Some(200),
        }),
        memory: Some(MemorySpec {
            limit: Some(Limit::Value(MemorySize::from_mb(256))),
            reservation: Some(MemorySize::from_mb(64)),
            swap_limit: Some(Limit::Max),
        }),
        diskio: Some(DiskIoSpec {
            weight: Some(50),
            device_limits: Some(vec![DeviceLimit {
                major: 8,
                minor: 0,
                read_bps: Limit::Value(1_048_576),
                write_bps: Limit::Max,
            }]),
        }),
        network: Some(NetworkSpec {
            class_id: Some(0x0010_0001),
            priorities: Some([("eth0".to_string(), 5)].into()),
        }),
        monitoring: Some(MonitoringSpec {
            pressure: Some(true),
        }),
        global: Some(GlobalSpec {
            max_tasks: Some(Limit::Value(512)),
            frozen: Some(false),
        }),
    };

    let json = serde_json::to_string_pretty(&spec).unwrap();
    let back: ContainerSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(back, spec);
    assert_eq!(back.present(), ResourceType::ALL);
}

#[test]
fn test_with_defaults_is_idempotent() {
    let once = CpuSpec {
        weight: Some(10),
        ..Default::default()
    }
    .with_defaults();
    let twice = once.clone().with_defaults();

    assert_eq!(once, twice);
    assert_eq!(once.limit, Some(Limit::Max));
    assert_eq!(once.weight, Some(10));
}

#[test]
fn test_event_spec_kinds() {
    let spec = EventSpec {
        pressure: Some(PressureEvent {
            resource: PressureResource::Memory,
            stall_us: 5_000,
        }),
        ..Default::default()
    };
    assert!(matches!(spec.kind().unwrap(), EventKind::Pressure(_)));

    let two = EventSpec {
        oom: Some(OomEvent {}),
        memory_threshold: Some(MemoryThresholdEvent {
            usage: MemorySize::from_mb(100),
        }),
        ..Default::default()
    };
    assert_eq!(two.kind().unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_stats_type_default_is_summary() {
    assert_eq!(StatsType::default(), StatsType::Summary);
    let policy: UpdatePolicy = serde_json::from_str("\"replace\"").unwrap();
    assert_eq!(policy, UpdatePolicy::Replace);
}
