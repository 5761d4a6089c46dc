//! Tests for NativeLibrary lookups, caching and debug-info acquisition

mod common;

use std::fs;

use common::{library_config, module, signature, standard_host, CountingExports, FakeHost, ScriptedProvider, BASE};
use nativelookup_core::host::SymbolSource;
use nativelookup_core::symbols::{CachedOffset, DebugInfoState};
use nativelookup_core::types::{Address, ModuleIdentity, SymbolKind};
use nativelookup_core::NativeLibrary;

fn open(fake: &FakeHost, dir: &tempfile::TempDir) -> NativeLibrary
{
    NativeLibrary::open(module(), fake.host.clone(), library_config(dir.path())).unwrap()
}

#[test]
fn test_export_offset_is_relative_to_base()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);

    assert_eq!(library.exported_function_offset("Bar"), Some(0x1000));
    assert_eq!(
        library.symbol_address(SymbolKind::Export, "Bar"),
        Some(Address::new(BASE + 0x1000))
    );
}

#[test]
fn test_export_lookup_is_idempotent()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);

    assert_eq!(library.symbol_offset(SymbolKind::Export, "Bar"), Some(0x1000));
    assert_eq!(library.symbol_offset(SymbolKind::Export, "Bar"), Some(0x1000));
    assert_eq!(fake.export_calls(), 1);
}

#[test]
fn test_missing_export_is_cached()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);

    assert_eq!(library.exported_function_offset("Missing"), None);
    assert_eq!(library.exported_function_offset("Missing"), None);
    assert_eq!(fake.export_calls(), 1);
    assert_eq!(library.last_error(), Some(common::ERROR_PROC_NOT_FOUND));
    assert_eq!(
        library.cache_snapshot().get(SymbolKind::Export, "Missing"),
        Some(CachedOffset::Absent)
    );
}

#[test]
fn test_export_lookup_does_not_touch_debug_info()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);

    library.exported_function_offset("Bar");
    library.exported_function_offset("Missing");

    // Only the identity derivation at construction
    assert_eq!(fake.provider.loads(), 1);
    assert_eq!(fake.provider.enumerations(), 0);
    assert_eq!(library.debug_info_state(), DebugInfoState::Unloaded);
}

#[test]
fn test_symbol_at_base_is_absent()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeHost::new(CountingExports::new(&[("AtBase", 0)]), ScriptedProvider::new(&[]));
    let library = open(&fake, &dir);

    assert_eq!(library.exported_function_offset("AtBase"), None);
    assert_eq!(library.exported_function_offset("AtBase"), None);
    assert_eq!(fake.export_calls(), 1);
}

#[test]
fn test_identity_from_signature()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);

    let identity = ModuleIdentity::new("UnityPlayer.dll", signature());
    assert_eq!(library.identity(), Some(&identity));
    assert_eq!(
        library.cache_file_path(),
        Some(dir.path().join("symbols").join("UnityPlayer.dll.123456789ABCDEF001020304050607082.tsv"))
    );
    // Identity derivation runs local-only and tears its session down
    assert_eq!(fake.provider.search_paths(), vec![String::new()]);
    assert_eq!(fake.provider.cleanups.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn test_debug_info_lookup_builds_table_once()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);

    assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), Some(0x0052_3410));
    assert_eq!(library.symbol_offset(SymbolKind::Data, "gMainThreadId"), Some(0x00f0_0010));
    assert_eq!(library.symbol_offset(SymbolKind::Label, "loop_head"), Some(0x0052_3500));
    assert_eq!(
        library.symbol_offset(SymbolKind::PublicSymbol, "?PlayerLoop@@YAXXZ"),
        Some(0x0052_3410)
    );

    assert!(library.has_debug_info());
    assert_eq!(fake.provider.loads(), 2);
    assert_eq!(fake.provider.enumerations(), 1);
}

#[test]
fn test_missing_debug_symbol_is_cached()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);

    assert_eq!(library.symbol_offset(SymbolKind::Function, "NoSuchFunction"), None);
    assert_eq!(
        library.cache_snapshot().get(SymbolKind::Function, "NoSuchFunction"),
        Some(CachedOffset::Absent)
    );

    library.release_symbol_table();
    assert_eq!(library.symbol_offset(SymbolKind::Function, "NoSuchFunction"), None);
    assert_eq!(fake.provider.enumerations(), 1);
}

#[test]
fn test_kinds_are_separate()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);

    assert_eq!(library.symbol_offset(SymbolKind::Data, "PlayerLoop"), None);
    assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), Some(0x0052_3410));
}

#[test]
fn test_search_path_filters_servers()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);
    library.set_symbol_servers(vec![
        "https://good/".to_string(),
        "bad *url".to_string(),
        "also*bad".to_string(),
    ]);

    assert!(library.acquire_debug_info());

    let expected = format!("cache*{};srv*https://good/", dir.path().join(".debuginfo").display());
    assert_eq!(library.search_path().to_string(), expected);
    assert_eq!(fake.provider.search_paths().last(), Some(&expected));
}

#[test]
fn test_failed_acquisition_is_sticky()
{
    let dir = tempfile::tempdir().unwrap();
    let mut provider = ScriptedProvider::new(&[(SymbolKind::Function, "PlayerLoop", 0x10)]);
    provider.source = SymbolSource::Exports;
    let fake = FakeHost::new(CountingExports::new(&[("Bar", 0x1000)]), provider);
    let library = open(&fake, &dir);

    assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), None);
    assert_eq!(library.debug_info_state(), DebugInfoState::Failed);
    let loads = fake.provider.loads();

    assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), None);
    assert_eq!(library.symbol_offset(SymbolKind::Data, "other"), None);
    assert!(!library.acquire_debug_info());
    assert_eq!(fake.provider.loads(), loads);

    assert_eq!(
        library.cache_snapshot().get(SymbolKind::Function, "PlayerLoop"),
        Some(CachedOffset::Absent)
    );
    assert_eq!(library.cache_snapshot().get(SymbolKind::Data, "other"), Some(CachedOffset::Absent));
    // Exports keep working
    assert_eq!(library.exported_function_offset("Bar"), Some(0x1000));
}

#[test]
fn test_miss_without_debug_info_is_persisted()
{
    let dir = tempfile::tempdir().unwrap();
    let exports_only = || {
        let mut provider = ScriptedProvider::new(&[(SymbolKind::Function, "PlayerLoop", 0x10)]);
        provider.source = SymbolSource::Exports;
        FakeHost::new(CountingExports::default(), provider)
    };

    {
        let fake = exports_only();
        let library = open(&fake, &dir);
        assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), None);
        assert_eq!(library.debug_info_state(), DebugInfoState::Failed);
    }

    let fake = exports_only();
    let library = open(&fake, &dir);
    let loads = fake.provider.loads();

    assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), None);
    assert_eq!(fake.provider.loads(), loads);
    assert_eq!(library.debug_info_state(), DebugInfoState::Unloaded);
}

#[test]
fn test_server_change_acquires_debug_info()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);
    let loads = fake.provider.loads();

    library.set_symbol_servers(vec!["https://good/".to_string()]);

    assert_eq!(fake.provider.loads(), loads + 1);
    assert_eq!(fake.provider.enumerations(), 1);
    assert_eq!(library.debug_info_state(), DebugInfoState::Loaded);
    let expected = format!("cache*{};srv*https://good/", dir.path().join(".debuginfo").display());
    assert_eq!(fake.provider.search_paths().last(), Some(&expected));

    // Already loaded: later changes only affect the stored list
    library.set_symbol_servers(vec!["https://other/".to_string()]);
    assert_eq!(fake.provider.loads(), loads + 1);
    assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), Some(0x0052_3410));
    assert_eq!(fake.provider.enumerations(), 1);
}

#[test]
fn test_same_servers_do_not_acquire()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);
    let loads = fake.provider.loads();

    library.set_symbol_servers(vec!["https://symbolserver.unity3d.com/".to_string()]);
    // Unusable entries are filtered out before comparing
    library.set_symbol_servers(vec![
        "https://symbolserver.unity3d.com/".to_string(),
        "bad *url".to_string(),
    ]);

    assert_eq!(fake.provider.loads(), loads);
    assert_eq!(fake.provider.enumerations(), 0);
    assert_eq!(library.debug_info_state(), DebugInfoState::Unloaded);
}

#[test]
fn test_server_change_does_not_retry_failure()
{
    let dir = tempfile::tempdir().unwrap();
    let mut provider = ScriptedProvider::new(&[(SymbolKind::Function, "PlayerLoop", 0x10)]);
    provider.source = SymbolSource::Exports;
    let fake = FakeHost::new(CountingExports::default(), provider);
    let library = open(&fake, &dir);

    assert!(!library.acquire_debug_info());
    assert_eq!(library.debug_info_state(), DebugInfoState::Failed);
    let loads = fake.provider.loads();

    library.set_symbol_servers(vec!["https://good/".to_string()]);

    assert_eq!(fake.provider.loads(), loads);
    assert_eq!(library.debug_info_state(), DebugInfoState::Failed);
    assert_eq!(library.config().symbol_servers, vec!["https://good/".to_string()]);
}

#[test]
fn test_load_failure_records_error()
{
    let dir = tempfile::tempdir().unwrap();
    let mut provider = ScriptedProvider::new(&[]);
    provider.fail_initialize = Some(87);
    let fake = FakeHost::new(CountingExports::new(&[("Bar", 0x1000)]), provider);
    let library = open(&fake, &dir);

    assert_eq!(library.identity(), None);
    assert_eq!(library.last_error(), Some(87));
    assert_eq!(library.cache_file_path(), None);
    assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), None);
    assert_eq!(library.exported_function_offset("Bar"), Some(0x1000));
}

#[test]
fn test_partial_enumeration_keeps_symbols()
{
    let dir = tempfile::tempdir().unwrap();
    let mut provider = ScriptedProvider::new(&[
        (SymbolKind::Function, "first", 0x100),
        (SymbolKind::Function, "second", 0x200),
        (SymbolKind::Function, "third", 0x300),
    ]);
    provider.fail_enumeration_after = Some(2);
    let fake = FakeHost::new(CountingExports::default(), provider);
    let library = open(&fake, &dir);

    assert_eq!(library.symbol_offset(SymbolKind::Function, "first"), Some(0x100));
    assert_eq!(library.symbol_offset(SymbolKind::Function, "second"), Some(0x200));
    assert_eq!(library.symbol_offset(SymbolKind::Function, "third"), None);
    assert!(library.has_debug_info());
    assert_eq!(library.last_error(), Some(common::ERROR_FILE_NOT_FOUND));
}

#[test]
fn test_released_table_rebuilds_locally()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);

    let table = library.symbol_table().unwrap();
    assert_eq!(table.get(SymbolKind::Function, "PlayerLoop"), Some(0x0052_3410));
    library.release_symbol_table();

    // Handles already given out stay valid
    assert_eq!(table.len(), 4);

    assert_eq!(library.symbol_offset(SymbolKind::Data, "gMainThreadId"), Some(0x00f0_0010));
    assert_eq!(fake.provider.enumerations(), 2);

    let store_only = format!("cache*{}", dir.path().join(".debuginfo").display());
    assert_eq!(fake.provider.search_paths().last(), Some(&store_only));
}

#[test]
fn test_cache_file_round_trip()
{
    let dir = tempfile::tempdir().unwrap();
    {
        let fake = standard_host();
        let library = open(&fake, &dir);
        assert_eq!(library.exported_function_offset("Bar"), Some(0x1000));
        assert_eq!(library.exported_function_offset("Missing"), None);
        assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), Some(0x0052_3410));
        assert_eq!(library.symbol_offset(SymbolKind::Function, "NoSuchFunction"), None);
    }

    let fake = standard_host();
    let library = open(&fake, &dir);
    assert_eq!(library.exported_function_offset("Bar"), Some(0x1000));
    assert_eq!(library.exported_function_offset("Missing"), None);
    assert_eq!(library.symbol_offset(SymbolKind::Function, "PlayerLoop"), Some(0x0052_3410));
    assert_eq!(library.symbol_offset(SymbolKind::Function, "NoSuchFunction"), None);

    assert_eq!(fake.export_calls(), 0);
    assert_eq!(fake.provider.enumerations(), 0);
    assert_eq!(library.debug_info_state(), DebugInfoState::Unloaded);
}

#[test]
fn test_cache_file_contents()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);
    library.exported_function_offset("Bar");
    library.exported_function_offset("Missing");

    let text = fs::read_to_string(library.cache_file_path().unwrap()).unwrap();
    assert_eq!(text, "39\tBar\t0x00001000\n39\tMissing\t0x00000000\n");
}

#[test]
fn test_corrupt_cache_is_discarded()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let path = open(&fake, &dir).cache_file_path().unwrap();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "39\tBar\t0x00009999\n39\tBaz\tnot-hex\n").unwrap();

    let library = open(&fake, &dir);
    assert!(library.cache_snapshot().is_empty());
    assert_eq!(library.exported_function_offset("Bar"), Some(0x1000));
    assert_eq!(fake.export_calls(), 1);

    // The next write replaces the corrupt file
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text, "39\tBar\t0x00001000\n");
}

#[test]
fn test_without_cache_directory_nothing_is_written()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let mut config = library_config(dir.path());
    config.cache_directory = None;
    let library = NativeLibrary::open(module(), fake.host.clone(), config).unwrap();

    assert_eq!(library.cache_file_path(), None);
    assert_eq!(library.exported_function_offset("Bar"), Some(0x1000));
    assert!(library.flush().is_ok());
    assert!(!dir.path().join("symbols").exists());
}

#[test]
fn test_set_cache_directory_merges_existing_file()
{
    let dir = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let fake = standard_host();

    {
        let library = open(&fake, &other);
        library.exported_function_offset("mono_get_root_domain");
    }

    let library = open(&fake, &dir);
    library.exported_function_offset("Bar");
    library.set_cache_directory(Some(other.path().join("symbols")));

    let snapshot = library.cache_snapshot();
    assert_eq!(snapshot.get(SymbolKind::Export, "Bar"), Some(CachedOffset::Resolved(0x1000)));
    assert_eq!(
        snapshot.get(SymbolKind::Export, "mono_get_root_domain"),
        Some(CachedOffset::Resolved(0x2040))
    );

    let text = fs::read_to_string(library.cache_file_path().unwrap()).unwrap();
    assert!(text.contains("39\tBar\t0x00001000\n"));
    assert!(text.contains("39\tmono_get_root_domain\t0x00002040\n"));
}

#[test]
fn test_flush_writes_cache()
{
    let dir = tempfile::tempdir().unwrap();
    let fake = standard_host();
    let library = open(&fake, &dir);
    library.exported_function_offset("Bar");

    let path = library.cache_file_path().unwrap();
    fs::remove_file(&path).unwrap();
    library.flush().unwrap();
    assert!(path.exists());
}
