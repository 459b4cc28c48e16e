mod common;

use common::{design_of, diamond_modules, evaluate_taint_sum};
use divaift_ift::summary::{TAINT_HASH, TAINT_HIER_SUM, TAINT_LOCAL_SUM, TAINT_SINK_SUM, TAINT_SUM};
use divaift_ift::{
    IftError, IgnoreList, Instrumenter, Pass, SinkLocator, SinkQuery, SummaryMode, SummaryReducer,
};
use divaift_netlist::cell_types::{COVERAGE_COLLECTOR, TAINT_REGISTER};
use divaift_netlist::{Design, Module, SignalRole, StageState};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn instrumented_diamond() -> Design {
    let mut design = design_of(diamond_modules());
    Instrumenter::new(1)
        .with_ignore(IgnoreList::parse("clk"))
        .run(&mut design)
        .unwrap();
    design
}

#[test]
fn test_sum_reaches_top_through_every_instance() {
    let mut design = instrumented_diamond();
    SummaryReducer::default().run(&mut design).unwrap();

    let top = design.module("Top").unwrap();
    for signal in ["u_a_MidA_taint_sum", "u_b_MidB_taint_sum"] {
        let id = top.find_signal(signal).unwrap();
        assert_eq!(top.signal(id).width, 32);
        assert!(top.signal(id).meta.keep);
    }
    for name in design.module_names() {
        let m = design.module(&name).unwrap();
        let port = m.find_port(TAINT_SUM).unwrap();
        assert_eq!(m.signal(port).meta.role, SignalRole::Observability);
        assert!(m.find_signal(TAINT_LOCAL_SUM).is_some());
        assert!(m.find_signal(TAINT_HIER_SUM).is_some());
    }

    let leaf = design.module("Leaf").unwrap();
    let reg = leaf
        .nodes
        .iter()
        .find(|n| n.cell_type == TAINT_REGISTER)
        .unwrap();
    let tap = reg.port(TAINT_SUM).unwrap().first_signal().unwrap();
    assert_eq!(leaf.signal(tap).width, 1);
}

#[test]
fn test_sum_conserves_every_contribution() {
    let mut design = instrumented_diamond();
    SummaryReducer::new(SummaryMode::Sum {
        split_sinks: true,
        array_only: false,
    })
    .run(&mut design)
    .unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..16 {
        let (seen, expected) = evaluate_taint_sum(&design, "Top", &mut rng);
        assert_eq!(seen, expected);
    }
}

#[test]
fn test_two_registers_and_one_submodule() {
    let mut child = Module::new("Child");
    child.add_node("t0", TAINT_REGISTER).unwrap();
    child.meta.stages.ports = StageState::Done;
    let mut core = Module::new("Core");
    core.add_node("t0", TAINT_REGISTER).unwrap();
    core.add_node("t1", TAINT_REGISTER).unwrap();
    core.add_node("u_child", "Child").unwrap();
    core.meta.stages.ports = StageState::Done;
    let mut design = design_of(vec![core, child]);
    SummaryReducer::default().run(&mut design).unwrap();

    let core = design.module("Core").unwrap();
    let widths: Vec<u32> = core
        .nodes
        .iter()
        .filter_map(|n| n.port(TAINT_SUM))
        .map(|s| s.width())
        .collect();
    assert_eq!(widths, vec![1, 1, 32]);

    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..8 {
        let (seen, expected) = evaluate_taint_sum(&design, "Core", &mut rng);
        assert_eq!(seen, expected);
    }
}

#[test]
fn test_array_only_skips_registers() {
    let mut design = instrumented_diamond();
    SummaryReducer::new(SummaryMode::Sum {
        split_sinks: false,
        array_only: true,
    })
    .run(&mut design)
    .unwrap();

    let leaf = design.module("Leaf").unwrap();
    assert!(leaf.nodes.iter().all(|n| n.port(TAINT_SUM).is_none()));
    assert!(leaf.find_port(TAINT_SUM).is_some());
}

#[test]
fn test_ignored_modules_are_not_summarised() {
    let mut modules = diamond_modules();
    modules[2].meta.ignore = true;
    let mut design = design_of(modules);
    Instrumenter::new(1).run(&mut design).unwrap();
    SummaryReducer::default().run(&mut design).unwrap();

    assert!(design.module("MidB").unwrap().find_port(TAINT_SUM).is_none());
    let top = design.module("Top").unwrap();
    assert!(top.find_signal("u_a_MidA_taint_sum").is_some());
    assert!(top.find_signal("u_b_MidB_taint_sum").is_none());
}

#[test]
fn test_hash_collects_one_fingerprint_per_register() {
    let mut design = instrumented_diamond();
    let mut pass = SummaryReducer::new(SummaryMode::Hash { seed: 2024 });
    assert_eq!(pass.name(), "tcov");
    pass.run(&mut design).unwrap();

    let leaf = design.module("Leaf").unwrap();
    let reg = leaf
        .nodes
        .iter()
        .find(|n| n.cell_type == TAINT_REGISTER)
        .unwrap();
    assert_eq!(reg.param("COVERAGE_WIDTH").and_then(|p| p.as_int()), Some(9));
    let id = reg.param("COVERAGE_ID").and_then(|p| p.as_int()).unwrap();
    assert!((1..512).contains(&id));
    assert_eq!(reg.port(TAINT_HASH).map(|s| s.width()), Some(9));

    let collectors: Vec<_> = leaf
        .nodes
        .iter()
        .filter(|n| n.cell_type == COVERAGE_COLLECTOR)
        .collect();
    assert_eq!(collectors.len(), 1);
    assert!(collectors[0].meta.keep);

    // Wrappers without registers get no collector
    let mid = design.module("MidA").unwrap();
    assert!(mid.nodes.iter().all(|n| n.cell_type != COVERAGE_COLLECTOR));

    // Collectors are passed through by a later instrumentation run
    let before = design.stats();
    Instrumenter::new(1).run(&mut design).unwrap();
    assert_eq!(design.stats(), before);
}

/// TestHarness -> tile_reset_domain: Tile, holding one sink taint register
fn harness_with_sink() -> Design {
    let mut tile = Module::new("Tile");
    let reg = tile.add_node("r_t", TAINT_REGISTER).unwrap();
    tile.node_mut(reg).meta.sink = true;
    tile.meta.stages.ports = StageState::Done;
    let mut harness = Module::new("TestHarness");
    harness.add_node("tile_reset_domain", "Tile").unwrap();
    design_of(vec![harness, tile])
}

#[test]
fn test_harness_sinks_need_the_split_accumulator() {
    let mut design = harness_with_sink();
    SummaryReducer::default().run(&mut design).unwrap();
    let err = SinkLocator::new(SinkQuery::Flagged)
        .run(&mut design)
        .unwrap_err();
    assert!(matches!(err, IftError::SinkSumMissing { ref module, .. } if module == "Tile"));

    let mut design = harness_with_sink();
    SummaryReducer::new(SummaryMode::Sum {
        split_sinks: true,
        array_only: false,
    })
    .run(&mut design)
    .unwrap();
    assert!(design.module("Tile").unwrap().find_signal(TAINT_SINK_SUM).is_some());
    let mut locator = SinkLocator::new(SinkQuery::Flagged);
    locator.run(&mut design).unwrap();
    assert_eq!(locator.paths(), ["/ldut/tile_reset_domain"]);
}
