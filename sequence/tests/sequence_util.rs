use script::{CommandRegistry, TextParser};
use sequence::command::{Command, CommandKind, ObjectType};
use sequence::util::*;
use sequence::{CommandArena, CommandId, SequenceError};

fn parser() -> TextParser {
    TextParser::new(CommandRegistry::default())
}

fn structural(arena: &mut CommandArena, kind: CommandKind) -> CommandId {
    arena.insert(Command::new(kind))
}

fn line(arena: &mut CommandArena, text: &str) -> CommandId {
    let command = Command::from_line(text, &mut parser()).expect("command should parse");
    arena.insert(command)
}

fn chain(arena: &mut CommandArena, head: CommandId, ids: &[CommandId]) {
    for id in ids {
        arena.append(head, *id).unwrap();
    }
}

fn branch(arena: &mut CommandArena, parent: CommandId, index: usize, ids: &[CommandId]) {
    for id in ids {
        arena.append_to_branch(parent, index, *id).unwrap();
    }
}

/// `NoOp -> BeginScript -> x = 1 -> EndScript -> NoOp`
fn script_block() -> (CommandArena, [CommandId; 5]) {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let begin = structural(&mut arena, CommandKind::BeginScript);
    let assign = line(&mut arena, "x = 1;");
    let end = structural(&mut arena, CommandKind::EndScript);
    let tail = structural(&mut arena, CommandKind::NoOp);
    chain(&mut arena, head, &[begin, assign, end, tail]);
    (arena, [head, begin, assign, end, tail])
}

// ---------------------------------------------------------------------------
// First / last / matching end
// ---------------------------------------------------------------------------

#[test]
fn first_last_and_matching_end_of_script_block() {
    let (arena, [head, begin, assign, end, tail]) = script_block();

    assert_eq!(get_matching_end(&arena, begin), Some(end));
    for id in [head, begin, assign, end, tail] {
        assert_eq!(get_first_command(&arena, id), head);
        assert_eq!(get_last_command(&arena, id), tail);
    }
}

#[test]
fn first_and_last_of_single_node() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    assert_eq!(get_first_command(&arena, head), head);
    assert_eq!(get_last_command(&arena, head), head);
}

#[test]
fn next_command_steps_over_script_block() {
    let (arena, [head, begin, assign, _, tail]) = script_block();
    assert_eq!(get_next_command(&arena, head).unwrap(), Some(begin));
    assert_eq!(get_next_command(&arena, begin).unwrap(), Some(tail));
    assert_eq!(arena.next(begin), Some(assign));
    assert_eq!(get_next_command(&arena, tail).unwrap(), None);
}

#[test]
fn nested_script_blocks_balance() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let outer = structural(&mut arena, CommandKind::BeginScript);
    let inner = structural(&mut arena, CommandKind::BeginScript);
    let inner_end = structural(&mut arena, CommandKind::EndScript);
    let outer_end = structural(&mut arena, CommandKind::EndScript);
    chain(&mut arena, head, &[outer, inner, inner_end, outer_end]);

    assert_eq!(get_matching_end(&arena, outer), Some(outer_end));
    assert_eq!(get_matching_end(&arena, inner), Some(inner_end));
}

#[test]
fn unbalanced_script_block_is_structural_error() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let begin = structural(&mut arena, CommandKind::BeginScript);
    let assign = line(&mut arena, "x = 1;");
    chain(&mut arena, head, &[begin, assign]);

    assert_eq!(get_matching_end(&arena, begin), None);
    let err = get_next_command(&arena, begin).unwrap_err();
    assert!(matches!(err, SequenceError::UnmatchedBlock { .. }));
    let err = remove_command(&mut arena, head, begin).unwrap_err();
    assert!(matches!(err, SequenceError::UnmatchedBlock { ref type_name, .. } if type_name == "BeginScript"));
    assert_eq!(arena.live_count(), 3);
}

#[test]
fn matching_end_of_if_with_else() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let if_cmd = line(&mut arena, "If x < 2");
    chain(&mut arena, head, &[if_cmd]);
    let a = line(&mut arena, "y = 1;");
    let else_cmd = structural(&mut arena, CommandKind::Else);
    branch(&mut arena, if_cmd, 0, &[a, else_cmd]);
    let b = line(&mut arena, "y = 2;");
    let end_if = structural(&mut arena, CommandKind::EndIf);
    branch(&mut arena, if_cmd, 1, &[b, end_if]);

    assert_eq!(get_matching_end(&arena, if_cmd), Some(end_if));
}

#[test]
fn matching_end_of_if_without_else() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let if_cmd = line(&mut arena, "If x < 2");
    chain(&mut arena, head, &[if_cmd]);
    let a = line(&mut arena, "y = 1;");
    let end_if = structural(&mut arena, CommandKind::EndIf);
    branch(&mut arena, if_cmd, 0, &[a, end_if]);

    assert_eq!(arena.get(if_cmd).unwrap().branch_count(), 1);
    assert_eq!(get_matching_end(&arena, if_cmd), Some(end_if));
}

#[test]
fn else_without_second_branch_finds_nothing() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let if_cmd = line(&mut arena, "If x < 2");
    chain(&mut arena, head, &[if_cmd]);
    let else_cmd = structural(&mut arena, CommandKind::Else);
    branch(&mut arena, if_cmd, 0, &[else_cmd]);

    assert_eq!(get_matching_end(&arena, if_cmd), None);
}

#[test]
fn matching_end_of_plain_command_is_none() {
    let (arena, [_, _, assign, _, _]) = script_block();
    assert_eq!(get_matching_end(&arena, assign), None);
}

// ---------------------------------------------------------------------------
// Parents
// ---------------------------------------------------------------------------

/// `head -> For -> z = 0`, For branch: `If -> EndFor`, If branch: `a -> EndIf`.
fn nested() -> (CommandArena, [CommandId; 7]) {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let for_cmd = line(&mut arena, "For i = 1:3");
    let after = line(&mut arena, "z = 0;");
    chain(&mut arena, head, &[for_cmd, after]);

    let if_cmd = line(&mut arena, "If i > 1");
    let end_for = structural(&mut arena, CommandKind::EndFor);
    branch(&mut arena, for_cmd, 0, &[if_cmd, end_for]);

    let a = line(&mut arena, "y = Sat1.SMA;");
    let end_if = structural(&mut arena, CommandKind::EndIf);
    branch(&mut arena, if_cmd, 0, &[a, end_if]);

    (arena, [head, for_cmd, after, if_cmd, end_for, a, end_if])
}

#[test]
fn parent_of_nested_commands() {
    let (arena, [head, for_cmd, after, if_cmd, end_for, a, end_if]) = nested();

    assert_eq!(get_parent_command(&arena, head, a), Some(if_cmd));
    assert_eq!(get_parent_command(&arena, head, end_if), Some(if_cmd));
    assert_eq!(get_parent_command(&arena, head, if_cmd), Some(for_cmd));
    assert_eq!(get_parent_command(&arena, head, end_for), Some(for_cmd));
    assert_eq!(get_parent_command(&arena, head, for_cmd), Some(head));
    assert_eq!(get_parent_command(&arena, head, after), Some(head));

    assert_eq!(get_sub_parent(&arena, for_cmd, a), Some(if_cmd));
    assert_eq!(get_sub_parent(&arena, if_cmd, end_for), None);
}

#[test]
fn parent_of_unlinked_command_is_none() {
    let (mut arena, [head, ..]) = nested();
    let stray = line(&mut arena, "q = 1;");
    assert_eq!(get_parent_command(&arena, head, stray), None);
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

#[test]
fn remove_script_block_deletes_contents() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let begin = structural(&mut arena, CommandKind::BeginScript);
    let a = line(&mut arena, "a = 1;");
    let b = line(&mut arena, "b = 2;");
    let end = structural(&mut arena, CommandKind::EndScript);
    let c = line(&mut arena, "c = 3;");
    chain(&mut arena, head, &[begin, a, b, end, c]);
    assert_eq!(arena.live_count(), 6);

    let removed = remove_command(&mut arena, head, begin).unwrap();
    assert_eq!(removed, begin);
    assert!(!arena.contains(a));
    assert!(!arena.contains(b));
    assert!(!arena.contains(end));
    assert_eq!(arena.next(head), Some(c));
    assert_eq!(arena.previous(c), Some(head));

    // The caller owns the returned BeginScript.
    assert_eq!(arena.next(begin), None);
    assert_eq!(arena.previous(begin), None);
    assert_eq!(arena.live_count(), 3);
    arena.delete(begin).unwrap();
    assert_eq!(arena.live_count(), 2);
}

#[test]
fn remove_plain_command() {
    let (mut arena, [head, begin, assign, end, _]) = script_block();
    let removed = remove_command(&mut arena, head, assign).unwrap();
    assert_eq!(removed, assign);
    assert_eq!(arena.next(begin), Some(end));
    assert_eq!(arena.previous(end), Some(begin));
    assert!(arena.contains(assign));
}

#[test]
fn remove_first_command_of_branch() {
    let (mut arena, [head, _, _, if_cmd, _, a, end_if]) = nested();
    remove_command(&mut arena, head, a).unwrap();
    assert_eq!(arena.child(if_cmd, 0), Some(end_if));
    assert_eq!(arena.previous(end_if), None);
}

#[test]
fn remove_branch_command_keeps_its_branches() {
    let (mut arena, [head, for_cmd, _, if_cmd, end_for, a, _]) = nested();
    remove_command(&mut arena, head, if_cmd).unwrap();
    assert_eq!(arena.child(for_cmd, 0), Some(end_for));
    assert_eq!(arena.child(if_cmd, 0), Some(a));

    let live = arena.live_count();
    arena.delete(if_cmd).unwrap();
    assert_eq!(arena.live_count(), live - 3);
    assert!(!arena.contains(a));
}

#[test]
fn remove_head_is_refused() {
    let (mut arena, [head, ..]) = script_block();
    let err = remove_command(&mut arena, head, head).unwrap_err();
    assert!(matches!(err, SequenceError::CannotRemoveHead));
}

#[test]
fn remove_script_block_without_previous_fails() {
    let (mut arena, [head, ..]) = script_block();
    let orphan = structural(&mut arena, CommandKind::BeginScript);
    let err = remove_command(&mut arena, head, orphan).unwrap_err();
    assert!(matches!(err, SequenceError::NullPrevious { .. }));
    assert!(err.to_string().contains("previous command cannot be null"));
}

#[test]
fn remove_stale_handle() {
    let (mut arena, [head, _, assign, _, _]) = script_block();
    remove_command(&mut arena, head, assign).unwrap();
    arena.delete(assign).unwrap();
    let err = remove_command(&mut arena, head, assign).unwrap_err();
    assert!(matches!(err, SequenceError::StaleHandle(id) if id == assign));
}

// ---------------------------------------------------------------------------
// Clearing
// ---------------------------------------------------------------------------

#[test]
fn clear_everything() {
    let (mut arena, [head, ..]) = script_block();
    assert!(clear_command_seq(&mut arena, head, false, true));
    assert_eq!(arena.live_count(), 0);
}

#[test]
fn clear_nested_sequence() {
    let (mut arena, [head, ..]) = nested();
    assert_eq!(arena.live_count(), 7);
    assert!(clear_command_seq(&mut arena, head, false, false));
    assert_eq!(arena.live_count(), 0);
}

#[test]
fn clear_keeping_head() {
    let (mut arena, [head, ..]) = nested();
    assert!(clear_command_seq(&mut arena, head, true, true));
    assert_eq!(arena.live_count(), 1);
    assert!(arena.contains(head));
    assert_eq!(arena.next(head), None);
}

#[test]
fn clear_empty_and_stale_sequences() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    assert!(clear_command_seq(&mut arena, head, true, false));
    assert_eq!(arena.live_count(), 1);
    assert!(clear_command_seq(&mut arena, head, false, false));
    assert!(clear_command_seq(&mut arena, head, false, false));
    assert_eq!(arena.live_count(), 0);
}

#[test]
fn clear_with_unbalanced_script_block() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let begin = structural(&mut arena, CommandKind::BeginScript);
    let a = line(&mut arena, "a = 1;");
    chain(&mut arena, head, &[begin, a]);

    assert!(clear_command_seq(&mut arena, head, false, false));
    assert_eq!(arena.live_count(), 0);
}

// ---------------------------------------------------------------------------
// Ordering and search
// ---------------------------------------------------------------------------

#[test]
fn is_after() {
    let (arena, [head, begin, assign, end, tail]) = script_block();
    assert!(sequence::util::is_after(&arena, assign, assign));
    assert!(sequence::util::is_after(&arena, tail, begin));
    assert!(sequence::util::is_after(&arena, end, head));
    assert!(!sequence::util::is_after(&arena, begin, tail));
    assert!(!sequence::util::is_after(&arena, head, assign));
}

#[test]
fn find_object_inside_branches() {
    let (arena, [head, for_cmd, ..]) = nested();
    assert_eq!(
        find_object(&arena, for_cmd, ObjectType::Parameter, "Sat1").as_deref(),
        Some("Assignment")
    );
    assert_eq!(
        find_object(&arena, head, ObjectType::Spacecraft, "Sat1").as_deref(),
        Some("Assignment")
    );
    assert_eq!(find_object(&arena, head, ObjectType::Parameter, "Sat2"), None);
}

#[test]
fn find_object_reports_first_match() {
    let (arena, [head, ..]) = nested();
    // The For loop's own index comes before anything in its branch.
    assert_eq!(
        find_object(&arena, head, ObjectType::Parameter, "i").as_deref(),
        Some("For")
    );
}

#[test]
fn find_object_skips_commands_that_cannot_answer() {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let assign = line(&mut arena, "x = 1;");
    let optimize = line(&mut arena, "Optimize DC1");
    chain(&mut arena, head, &[assign, optimize]);

    assert!(arena.get(assign).unwrap().ref_object_names(ObjectType::Solver).is_err());
    assert_eq!(
        find_object(&arena, head, ObjectType::Solver, "DC1").as_deref(),
        Some("Optimize")
    );
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

fn listing_sequence() -> (CommandArena, CommandId, CommandId) {
    let mut arena = CommandArena::new();
    let head = arena.new_sequence();
    let x = line(&mut arena, "x = 1;");
    let if_cmd = line(&mut arena, "If x < 2");
    chain(&mut arena, head, &[x, if_cmd]);
    let y = line(&mut arena, "y = 3;");
    let end_if = structural(&mut arena, CommandKind::EndIf);
    branch(&mut arena, if_cmd, 0, &[y, end_if]);
    (arena, head, x)
}

#[test]
fn sequence_string_with_spaced_indent() {
    let (arena, head, _) = listing_sequence();
    let text = get_command_seq_string(&arena, head, false, false, "  ");
    assert_eq!(
        text,
        "\n---------- Mission Sequence ----------\n\
         \x20\x20NoOp\n\
         \x20\x20Assignment\n\
         \x20\x20If\n\
         \x20\x20\x20\x20Assignment\n\
         \x20\x20\x20\x20EndIf\n\
         \n"
    );
}

#[test]
fn sequence_string_with_unspaced_indent() {
    let (arena, head, _) = listing_sequence();
    let text = get_command_seq_string(&arena, head, false, false, "-");
    assert_eq!(
        text,
        "\n---------- Mission Sequence ----------\n\
         -NoOp\n\
         -Assignment\n\
         -If\n\
         .....-Assignment\n\
         .....-EndIf\n\
         \n"
    );
}

#[test]
fn sequence_string_with_generating_strings_and_addresses() {
    let (arena, head, x) = listing_sequence();
    let text = get_command_seq_string(&arena, head, true, true, "  ");
    assert!(text.contains(&format!("  ({})Assignment  <x = 1;>\n", x)));
    assert!(text.contains("  <If x < 2;>\n"));
    assert!(text.contains("    ("));
}

#[test]
fn sequence_string_deeper_nesting() {
    let (arena, [head, ..]) = nested();
    let text = get_command_seq_string(&arena, head, false, false, " ");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![
            "",
            "---------- Mission Sequence ----------",
            " NoOp",
            " For",
            "  If",
            "   Assignment",
            "   EndIf",
            "  EndFor",
            " Assignment",
            "",
        ]
    );
}

#[test]
fn all_commands_visits_branches_in_order() {
    let (arena, [head, for_cmd, after, if_cmd, end_for, a, end_if]) = nested();
    assert_eq!(
        all_commands(&arena, head),
        vec![head, for_cmd, if_cmd, a, end_if, end_for, after]
    );
}
