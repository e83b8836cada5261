//! Integration tests across the version algebra, registry, compatibility
//! analyzer and migration registry.

use strata_ast::{Stability, VersionInfo};
use strata_version::{Constraint, MigrationRegistry, Version, VersionRegistry};

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

fn info(version: &str, stability: Stability, replaces: Option<&str>) -> VersionInfo {
    VersionInfo {
        version: version.to_string(),
        stability,
        replaces: replaces.map(str::to_string),
        rollback_safe: None,
        deprecated: false,
    }
}

#[test]
fn canonical_form_round_trips() {
    for s in [
        "1", "v1", "1.2", "1.2.3", ":v2.0.0", "1.0.0-alpha.1", "2.1.0-rc.2+build.9",
    ] {
        let parsed = v(s);
        let formatted = parsed.to_string();
        assert_eq!(v(&formatted), parsed, "round trip failed for '{s}'");
        // The canonical key never carries build metadata.
        assert!(!parsed.canonical_key().contains('+'));
    }
}

#[test]
fn ordering_is_transitive_over_a_sorted_chain() {
    let mut versions = vec![
        v("2.0.0"),
        v("1.0.0-alpha"),
        v("1.0.0"),
        v("1.0.0-beta"),
        v("1.2.3"),
        v("0.9.0"),
    ];
    versions.sort();
    let rendered: Vec<String> = versions.iter().map(|x| x.to_string()).collect();
    assert_eq!(
        rendered,
        vec!["0.9.0", "1.0.0-alpha", "1.0.0-beta", "1.0.0", "1.2.3", "2.0.0"]
    );
    for window in versions.windows(3) {
        assert!(window[0] <= window[1] && window[1] <= window[2]);
        assert!(window[0] <= window[2]);
    }
}

#[test]
fn caret_bounds_are_exact() {
    for base in ["0.1.0", "1.2.3", "9.0.0"] {
        let base_v = v(base);
        let caret = Constraint::parse(&format!("^{base}")).unwrap();
        assert!(caret.satisfied_by(&base_v), "^{base} must accept {base}");
        assert!(
            !caret.satisfied_by(&base_v.next_major()),
            "^{base} must reject the next major"
        );
    }
}

#[test]
fn stable_resolution_across_mixed_chain() {
    let mut registry: VersionRegistry<&str> = VersionRegistry::new();
    registry
        .register("api", &info("1.0.0", Stability::Stable, None), "one")
        .unwrap();
    registry
        .register(
            "api",
            &info("2.0.0-beta.1", Stability::Beta, Some("1.0.0")),
            "two-beta",
        )
        .unwrap();
    registry
        .register(
            "api",
            &info("2.0.0", Stability::Stable, Some("2.0.0-beta.1")),
            "two",
        )
        .unwrap();

    assert_eq!(registry.get_latest("api").unwrap().node, "two");
    assert_eq!(registry.get_latest_stable("api").unwrap().node, "two");
    assert_eq!(
        registry
            .resolve("api", &Constraint::parse("stable").unwrap())
            .unwrap()
            .node,
        "two"
    );
    assert_eq!(
        registry
            .resolve("api", &Constraint::parse("~1.0.0").unwrap())
            .unwrap()
            .node,
        "one"
    );

    let chain = registry.replacement_chain("api", &v("1.0.0"));
    assert_eq!(chain, vec![v("2.0.0-beta.1"), v("2.0.0")]);
    assert!(registry.has_migration_path("api", &v("1.0.0"), &v("2.0.0")));
}

#[test]
fn malformed_replacement_cycle_terminates() {
    let mut registry: VersionRegistry<u8> = VersionRegistry::new();
    registry
        .register("loop", &info("1.0.0", Stability::Stable, Some("2.0.0")), 1)
        .unwrap();
    registry
        .register("loop", &info("2.0.0", Stability::Stable, Some("1.0.0")), 2)
        .unwrap();

    // Both directions stop once a version repeats.
    let forward = registry.replacement_chain("loop", &v("1.0.0"));
    assert!(forward.len() <= 2);
    let backward = registry.predecessor_chain("loop", &v("1.0.0"));
    assert!(backward.len() <= 2);

    let migrations = MigrationRegistry::new();
    let path = migrations.build_path("loop", &v("1.0.0"), &v("9.9.9"), &registry);
    assert!(!path.is_complete);
}

#[test]
fn coverage_is_full_when_every_pair_is_validated() {
    let registry: VersionRegistry<u8> = VersionRegistry::new();
    let migrations = MigrationRegistry::new();
    // No versions registered: vacuous full coverage.
    let report = migrations.analyze_coverage("ghost", &registry);
    assert_eq!(report.total_pairs, 0);
    assert_eq!(report.coverage_percentage, 100.0);
}
