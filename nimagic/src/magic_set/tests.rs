use super::*;

fn collect_errors(rules: &str) -> (MagicSet, Vec<ParseErrorKind>) {
    let mut kinds = Vec::new();
    let mut s = MagicSet::new();
    s.add_rules_with(rules.as_bytes(), &mut |e| kinds.push(e.kind.clone()))
        .unwrap();
    s.finalize();
    (s, kinds)
}

#[test]
fn garbage_line_is_skipped_not_fatal() {
    let rules = "\
0 string AB ab file
this is not a magic line at all
0 string CD cd file
";
    let (s, errors) = collect_errors(rules);
    assert_eq!(vec![ParseErrorKind::MalformedOffset], errors);
    assert_eq!("ab file", s.find(b"ABxx").unwrap().description);
    assert_eq!("cd file", s.find(b"CDxx").unwrap().description);
}

#[test]
fn unknown_type_reported_and_skipped() {
    let rules = "\
0 der x DER certificate
0 clear x reset
0 string AB ab file
";
    let (s, errors) = collect_errors(rules);
    assert_eq!(
        vec![
            ParseErrorKind::UnknownType("der".to_owned()),
            ParseErrorKind::UnknownType("clear".to_owned()),
        ],
        errors
    );
    assert_eq!("ab file", s.find(b"ABxx").unwrap().description);
}

#[test]
fn orphan_levels_reported() {
    let rules = "\
>0 string AB too deep
0 string AB ab file
>2 string CD skipped a level
";
    let (s, errors) = collect_errors(rules);
    assert_eq!(
        vec![ParseErrorKind::Orphan(1), ParseErrorKind::Orphan(2)],
        errors
    );
    assert_eq!("ab file", s.find(b"ABxx").unwrap().description);
}

#[test]
fn nesting_past_the_level_ceiling_reported() {
    let line = format!("{} byte 1 deep\n", ">".repeat(21).to_owned() + "0");
    let (_, errors) = collect_errors(&line);
    assert_eq!(vec![ParseErrorKind::InvalidLevel(21)], errors);
}

#[test]
fn continuation_attaches_to_most_recent_parent() {
    let rules = "\
0 string AB ab
>2 string CD cd
>2 string EF ef
>>4 string GH gh
";
    let (s, errors) = collect_errors(rules);
    assert!(errors.is_empty());
    // GH hangs off EF, the most recent level-1 entry
    assert_eq!("ab ef gh", s.find(b"ABEFGHxx").unwrap().description);
    assert_eq!("ab cd", s.find(b"ABCDxxxx").unwrap().description);
}

#[test]
fn mime_and_optional_attach_to_the_latest_entry() {
    let rules = "\
0 string AB ab file
!:mime application/x-ab
!:optional
";
    let (s, errors) = collect_errors(rules);
    assert!(errors.is_empty());
    let info = s.find(b"ABxx").unwrap();
    assert_eq!(Some("application/x-ab"), info.mime.as_deref());
    let root = s.get(s.roots[0]).unwrap();
    assert!(root.optional);
}

#[test]
fn optional_directive_ignored_when_disabled() {
    let mut s = MagicSet::with_options(MagicSetOptions {
        honor_optional: false,
        ..MagicSetOptions::default()
    });
    s.add_rules(&b"0 string AB ab\n!:optional\n"[..]).unwrap();
    s.finalize();
    assert!(!s.get(s.roots[0]).unwrap().optional);
}

#[test]
fn first_byte_index_covers_literal_roots_only() {
    let rules = "\
0 string PK zip
0 belong 0xcafebabe java class
0 regex hello greeting
0 string/c mz dos
";
    let (s, errors) = collect_errors(rules);
    assert!(errors.is_empty());
    assert_eq!(1, s.index_slot(b'P').len());
    assert_eq!(1, s.index_slot(0xca).len());
    // regex and case-folded strings have no deterministic first byte
    let indexed: usize = (0..=255u8).map(|b| s.index_slot(b).len()).sum();
    assert_eq!(2, indexed);
    assert_eq!(4, s.roots.len());
}

#[test]
fn index_disabled_by_options() {
    let mut s = MagicSet::with_options(MagicSetOptions {
        index_roots: false,
        ..MagicSetOptions::default()
    });
    s.add_rules(&b"0 string PK zip\n"[..]).unwrap();
    s.finalize();
    assert!(s.index_slot(b'P').is_empty());
    // the main list still answers
    assert_eq!("zip", s.find(b"PKxx").unwrap().description);
}

#[test]
fn finalize_is_idempotent() {
    let (mut s, _) = collect_errors("0 string PK zip\n");
    let before = s.index_slot(b'P').to_vec();
    s.finalize();
    assert_eq!(before, s.index_slot(b'P'));
}

#[test]
fn named_lookup_resolves_latest_definition() {
    let rules = "\
0 name chunk
>0 byte 1 one
0 name chunk
>0 byte 2 two
";
    let (s, errors) = collect_errors(rules);
    assert!(errors.is_empty());
    let id = s.named_lookup("chunk").unwrap();
    // later definitions overwrite earlier ones
    assert_eq!(EntryId(2), id);
    assert!(s.named_lookup("missing").is_none());
}

#[test]
fn rules_accumulate_across_readers() {
    let mut s = MagicSet::new();
    s.add_rules(&b"0 string AB ab\n"[..]).unwrap();
    s.add_rules(&b"0 string CD cd\n"[..]).unwrap();
    s.finalize();
    assert_eq!("ab", s.find(b"ABxx").unwrap().description);
    assert_eq!("cd", s.find(b"CDxx").unwrap().description);
}

#[test]
fn find_is_deterministic() {
    let (s, _) = collect_errors("0 string AB ab\n0 string/c ab folded\n");
    let a = s.find(b"ABCD");
    let b = s.find(b"ABCD");
    assert_eq!(a, b);
}

#[test]
fn finalized_set_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<MagicSet>();

    let (s, _) = collect_errors("0 string AB ab\n");
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                assert_eq!("ab", s.find(b"ABxx").unwrap().description);
            });
        }
    });
}

#[test]
fn default_options() {
    let options = MagicSetOptions::default();
    assert_eq!(20, options.max_levels);
    assert_eq!(15, options.max_recursion);
    assert!(options.honor_optional);
    assert!(options.index_roots);
}
