use script::{CommandRegistry, TextParser};
use sequence::command::control::RelationalOperator;
use sequence::command::{
    Command, CommandBody, CommandKind, InitContext, ObjectType, ResultState, SolveMode,
    replace_whole_word,
};
use sequence::objects::{ObjectStore, RefObject};
use sequence::solver::{ConstraintKind, DryRunSolver, ResultKind, Solver};
use sequence::SequenceError;

fn parse(line: &str) -> Result<Command, SequenceError> {
    let mut parser = TextParser::new(CommandRegistry::default());
    Command::from_line(line, &mut parser)
}

fn command(line: &str) -> Command {
    parse(line).expect("command should parse")
}

fn objects() -> ObjectStore {
    let mut objects = ObjectStore::new();
    objects.create("Spacecraft", "Sat1").unwrap();
    objects.create("VF13ad", "myOpt").unwrap();
    objects.create("Variable", "x").unwrap();
    objects
}

fn solver_types() -> Vec<String> {
    vec!["VF13ad".to_string(), "DifferentialCorrector".to_string()]
}

// ---------------------------------------------------------------------------
// Minimize / NonlinearConstraint decomposition
// ---------------------------------------------------------------------------

#[test]
fn minimize_decomposition() {
    let cmd = command("Minimize myOpt(Sat1.SMA);");
    assert_eq!(cmd.kind(), CommandKind::Minimize);
    assert_eq!(cmd.generating_string(), "Minimize myOpt(Sat1.SMA);");
    let CommandBody::Minimize(body) = cmd.body() else {
        panic!("expected a Minimize body");
    };
    assert_eq!(body.optimizer_name(), "myOpt");
    assert_eq!(body.objective_name(), "Sat1.SMA");
    assert_eq!(body.state(), ResultState::Unregistered);
}

#[test]
fn nonlinear_constraint_decomposition() {
    let cmd = command("NonlinearConstraint myOpt(Sat1.SMA<=21545.0);");
    let CommandBody::NonlinearConstraint(body) = cmd.body() else {
        panic!("expected a NonlinearConstraint body");
    };
    assert_eq!(body.optimizer_name(), "myOpt");
    assert_eq!(body.operator(), ConstraintKind::LessOrEqual);
    assert_eq!(body.operator().to_string(), "<=");
    assert_eq!(body.arg1_name(), "Sat1.SMA");
    assert_eq!(body.arg2_name(), "21545.0");
    assert!(body.is_inequality());
}

#[test]
fn nonlinear_constraint_operators() {
    let cmd = command("NonlinearConstraint DC1(Sat1.ECC = 0.01)");
    let CommandBody::NonlinearConstraint(body) = cmd.body() else {
        panic!("expected a NonlinearConstraint body");
    };
    assert_eq!(body.operator(), ConstraintKind::Equality);
    assert!(!body.is_inequality());
    assert_eq!(body.arg2_name(), "0.01");

    let cmd = command("NonlinearConstraint DC1(Sat1.INC >= -5)");
    let CommandBody::NonlinearConstraint(body) = cmd.body() else {
        panic!("expected a NonlinearConstraint body");
    };
    assert_eq!(body.operator(), ConstraintKind::GreaterOrEqual);
    assert_eq!(body.arg2_name(), "-5");
}

#[test]
fn disallowed_brackets_are_rejected() {
    for line in [
        "Minimize myOpt([Sat1.SMA])",
        "Minimize myOpt(Sat1.SMA, x)",
        "Minimize myOpt",
        "Minimize myOpt(3)",
        "NonlinearConstraint myOpt([Sat1.SMA] <= 3)",
        "NonlinearConstraint myOpt(Sat1.SMA < 7000)",
        "NonlinearConstraint myOpt(Sat1.SMA)",
    ] {
        let err = parse(line).unwrap_err();
        assert!(
            matches!(err, SequenceError::InvalidArgument { .. }),
            "{} gave {:?}",
            line,
            err
        );
    }
}

#[test]
fn invalid_argument_names_the_command() {
    let err = parse("Minimize myOpt([Sat1.SMA]);").unwrap_err();
    let text = err.to_string();
    assert!(text.contains("Minimize"), "{}", text);
    assert!(text.contains("Minimize myOpt([Sat1.SMA]);"), "{}", text);
}

// ---------------------------------------------------------------------------
// Register-then-report state machine
// ---------------------------------------------------------------------------

#[test]
fn minimize_registers_then_reports() {
    let objects = objects();
    let mut solver = DryRunSolver::new("myOpt");
    let mut cmd = command("Minimize myOpt(Sat1.SMA);");

    let CommandBody::Minimize(body) = cmd.body_mut() else {
        panic!("expected a Minimize body");
    };
    body.execute(&objects, &mut solver).unwrap();
    assert_eq!(body.state(), ResultState::Registered(0));
    assert_eq!(solver.results().len(), 1);
    assert_eq!(solver.results()[0].kind, ResultKind::Objective);
    assert_eq!(solver.results()[0].name, "Sat1.SMA");
    assert_eq!(solver.results()[0].value, None);

    body.execute(&objects, &mut solver).unwrap();
    body.execute(&objects, &mut solver).unwrap();
    assert_eq!(body.state(), ResultState::Reporting(0));
    assert_eq!(solver.results()[0].value, Some(7191.938817629));
    assert_eq!(solver.results()[0].reports, 2);

    cmd.run_complete();
    let CommandBody::Minimize(body) = cmd.body() else {
        panic!("expected a Minimize body");
    };
    assert_eq!(body.state(), ResultState::Unregistered);
}

#[test]
fn nonlinear_constraint_reports_signed_distance() {
    let mut objects = objects();
    objects.set_parameter("Sat1", "SMA", 7000.0);
    let mut solver = DryRunSolver::new("myOpt");
    let mut cmd = command("NonlinearConstraint myOpt(Sat1.SMA >= 8000)");

    let CommandBody::NonlinearConstraint(body) = cmd.body_mut() else {
        panic!("expected a NonlinearConstraint body");
    };
    assert_eq!(body.constraint_value(&objects).unwrap(), 1000.0);
    body.execute(&objects, &mut solver).unwrap();
    body.execute(&objects, &mut solver).unwrap();
    assert_eq!(body.state(), ResultState::Reporting(0));
    assert_eq!(
        solver.results()[0].kind,
        ResultKind::Constraint(ConstraintKind::GreaterOrEqual)
    );
    assert_eq!(solver.results()[0].value, Some(1000.0));
}

#[test]
fn report_to_wrong_solver_fails() {
    let objects = objects();
    let mut solver = DryRunSolver::new("DC1");
    let mut cmd = command("Minimize myOpt(Sat1.SMA)");
    let CommandBody::Minimize(body) = cmd.body_mut() else {
        panic!("expected a Minimize body");
    };
    let err = body.execute(&objects, &mut solver).unwrap_err();
    assert!(err.contains("myOpt"), "{}", err);
    assert!(solver.results().is_empty());
}

// ---------------------------------------------------------------------------
// Initialization
// ---------------------------------------------------------------------------

#[test]
fn initialize_resolves_solver() {
    let objects = objects();
    let types = solver_types();
    let context = InitContext {
        objects: &objects,
        solver_types: &types,
    };
    let mut cmd = command("Minimize myOpt(Sat1.SMA);");
    cmd.initialize(&context).unwrap();
}

#[test]
fn initialize_failure_carries_generating_string() {
    let objects = ObjectStore::new();
    let types = solver_types();
    let context = InitContext {
        objects: &objects,
        solver_types: &types,
    };
    let mut cmd = command("Minimize myOpt(Sat1.SMA);");
    let err = cmd.initialize(&context).unwrap_err();
    assert!(matches!(err, SequenceError::UnresolvedReference { .. }));
    let text = err.to_string();
    assert!(text.contains("Minimize myOpt(Sat1.SMA);"), "{}", text);
    assert!(text.contains("myOpt"), "{}", text);
}

#[test]
fn initialize_rejects_non_solver() {
    let mut objects = objects();
    objects.create("Spacecraft", "Sat2").unwrap();
    let types = solver_types();
    let context = InitContext {
        objects: &objects,
        solver_types: &types,
    };
    let mut cmd = command("NonlinearConstraint Sat2(Sat1.SMA <= 7000)");
    let err = cmd.initialize(&context).unwrap_err();
    assert!(err.to_string().contains("is not a solver"), "{}", err);

    let mut cmd = command("Optimize Sat2");
    assert!(cmd.initialize(&context).is_err());
    let mut cmd = command("Optimize myOpt");
    assert!(cmd.initialize(&context).is_ok());
}

#[test]
fn initialize_assignment_needs_objects() {
    let objects = objects();
    let types = solver_types();
    let context = InitContext {
        objects: &objects,
        solver_types: &types,
    };
    assert!(command("x = Sat1.SMA / 2;").initialize(&context).is_ok());
    let err = command("x = Sat9.SMA;").initialize(&context).unwrap_err();
    assert!(err.to_string().contains("Sat9"));
}

// ---------------------------------------------------------------------------
// Other command bodies
// ---------------------------------------------------------------------------

#[test]
fn condition_evaluation() {
    let mut objects = objects();
    objects.set_parameter("x", "Value", 1.0);

    let cmd = command("If Sat1.SMA > 7000 & x == 1");
    let CommandBody::Condition(condition) = cmd.body() else {
        panic!("expected a condition");
    };
    assert_eq!(condition.comparisons().count(), 2);
    assert_eq!(
        condition.comparisons().next().unwrap().operator,
        RelationalOperator::Greater
    );
    assert!(condition.evaluate(&objects).unwrap());

    let cmd = command("While x ~= 1 | x >= 2");
    let CommandBody::Condition(condition) = cmd.body() else {
        panic!("expected a condition");
    };
    assert!(!condition.evaluate(&objects).unwrap());
    objects.set_parameter("x", "Value", 3.0);
    assert!(condition.evaluate(&objects).unwrap());
}

#[test]
fn condition_requires_relational_operator() {
    assert!(matches!(
        parse("If x").unwrap_err(),
        SequenceError::InvalidArgument { .. }
    ));
}

#[test]
fn for_loop_bounds() {
    let objects = objects();
    let cmd = command("For x = 1:2:10");
    let CommandBody::ForLoop(for_loop) = cmd.body() else {
        panic!("expected a for loop");
    };
    assert_eq!(for_loop.bounds(&objects).unwrap(), (1.0, 2.0, 10.0));

    let cmd = command("For x = 5:0:10");
    let CommandBody::ForLoop(for_loop) = cmd.body() else {
        panic!("expected a for loop");
    };
    assert!(for_loop.bounds(&objects).is_err());

    assert!(parse("For 3 = 1:10").is_err());
    assert!(parse("For x = 1").is_err());
}

#[test]
fn solver_branch_options() {
    let cmd = command("Optimize myOpt {SolveMode = RunInitialGuess, ExitMode = SaveAndContinue}");
    let CommandBody::SolverBranch(branch) = cmd.body() else {
        panic!("expected a solver branch");
    };
    assert_eq!(branch.solver(), "myOpt");
    assert_eq!(branch.solve_mode(), SolveMode::RunInitialGuess);
    assert_eq!(branch.option("ExitMode"), Some("SaveAndContinue"));

    let cmd = command("Target 'Hohmann' DC1");
    assert_eq!(cmd.label(), Some("Hohmann"));
    let CommandBody::SolverBranch(branch) = cmd.body() else {
        panic!("expected a solver branch");
    };
    assert_eq!(branch.solver(), "DC1");
    assert_eq!(branch.solve_mode(), SolveMode::Solve);

    assert!(parse("Optimize myOpt {Color = Red}").is_err());
    assert!(parse("Optimize").is_err());
}

#[test]
fn generic_and_structural_commands() {
    let cmd = command("Report rf Sat1.SMA Sat1.ECC");
    assert_eq!(cmd.kind(), CommandKind::Generic);
    assert_eq!(cmd.type_name(), "Report");
    assert_eq!(
        cmd.ref_object_names(ObjectType::Any).unwrap(),
        vec!["rf".to_string(), "Sat1".to_string()]
    );

    let cmd = command("EndIf;");
    assert_eq!(cmd.kind(), CommandKind::EndIf);
    assert!(cmd.is_of_type("BranchEnd"));
    assert!(cmd.is_block_terminator());
    assert!(parse("EndIf x").is_err());
}

#[test]
fn is_of_type_families() {
    let if_cmd = command("If x < 1");
    assert!(if_cmd.is_of_type("If"));
    assert!(if_cmd.is_of_type("BranchCommand"));
    assert!(if_cmd.is_of_type("ConditionalBranch"));
    assert!(if_cmd.is_of_type("GmatCommand"));
    assert!(!if_cmd.is_of_type("BranchEnd"));

    let else_cmd = Command::new(CommandKind::Else);
    assert!(else_cmd.is_of_type("BranchEnd"));
    assert!(!else_cmd.is_block_terminator());

    let optimize = command("Optimize myOpt");
    assert!(optimize.is_of_type("SolverBranchCommand"));
    assert!(optimize.is_block_opener());

    let begin = Command::new(CommandKind::BeginScript);
    assert!(begin.is_block_opener());
    assert!(!begin.has_children());
    assert_eq!(begin.generating_string(), "BeginScript;");
}

#[test]
fn function_call_command() {
    let cmd = command("[a, b] = Compute(x, Sat1.SMA);");
    assert_eq!(cmd.kind(), CommandKind::CallFunction);
    assert_eq!(
        cmd.ref_object_names(ObjectType::Function).unwrap(),
        vec!["Compute".to_string()]
    );
    assert!(cmd.ref_object_names(ObjectType::Solver).is_err());
}

// ---------------------------------------------------------------------------
// Renaming
// ---------------------------------------------------------------------------

#[test]
fn rename_inside_bracketed_arguments_takes_effect() {
    let mut cmd = command("NonlinearConstraint myOpt(Tank1.FuelMass <= 100)");
    assert!(cmd.rename_ref_object(ObjectType::Parameter, "Tank1", "MainTank"));
    assert_eq!(
        cmd.generating_string(),
        "NonlinearConstraint myOpt(MainTank.FuelMass <= 100);"
    );
    assert_eq!(
        cmd.ref_object_names(ObjectType::Parameter).unwrap(),
        vec!["MainTank".to_string()]
    );
    let CommandBody::NonlinearConstraint(body) = cmd.body() else {
        panic!("expected a NonlinearConstraint body");
    };
    assert_eq!(body.arg1_name(), "MainTank.FuelMass");
}

#[test]
fn rename_solver_reference() {
    let mut cmd = command("Minimize myOpt(Sat1.SMA)");
    assert!(cmd.rename_ref_object(ObjectType::Solver, "myOpt", "SQP1"));
    assert_eq!(cmd.generating_string(), "Minimize SQP1(Sat1.SMA);");
    assert_eq!(
        cmd.ref_object_names(ObjectType::Solver).unwrap(),
        vec!["SQP1".to_string()]
    );
    assert!(!cmd.rename_ref_object(ObjectType::Solver, "Sat1", "Sat2"));
}

#[test]
fn rename_generic_arguments() {
    let mut cmd = command("Report rf Sat1.SMA Sat10.SMA");
    assert!(cmd.rename_ref_object(ObjectType::Spacecraft, "Sat1", "Sat2"));
    assert_eq!(cmd.generating_string(), "Report rf Sat2.SMA Sat10.SMA;");
    assert!(!cmd.rename_ref_object(ObjectType::Spacecraft, "Sat3", "Sat4"));
}

#[test]
fn replace_whole_word_respects_identifier_boundaries() {
    assert_eq!(
        replace_whole_word("Sat1.SMA + Sat10.SMA - Sat1", "Sat1", "Sat2"),
        "Sat2.SMA + Sat10.SMA - Sat2"
    );
    assert_eq!(replace_whole_word("x.Sat1", "Sat1", "Sat2"), "x.Sat1");
    assert_eq!(replace_whole_word("mySat1", "Sat1", "Sat2"), "mySat1");
    assert_eq!(replace_whole_word("Sat1Sat1 Sat1", "Sat1", "S"), "Sat1Sat1 S");
}
