//! Configuration resources and their effect on readers.

use anyhow::Result;
use ironsplit::config::{keys, parse_resource, resolve_resource_path};
use ironsplit::testing::*;
use ironsplit::{Configuration, Error, InputFormatReader, OperatorContext, OutputPort, ReaderParams};
use std::path::Path;

fn site(props: &[(&str, &str, bool)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<configuration>\n");
    for (name, value, is_final) in props {
        xml.push_str(&format!(
            "  <property>\n    <name>{name}</name>\n    <value>{value}</value>\n{}  </property>\n",
            if *is_final {
                "    <final>true</final>\n"
            } else {
                ""
            }
        ));
    }
    xml.push_str("</configuration>\n");
    xml
}

fn write_site(dir: &Path, name: &str, props: &[(&str, &str, bool)]) -> Result<()> {
    std::fs::write(dir.join(name), site(props))?;
    Ok(())
}

#[test]
fn test_defaults() -> Result<()> {
    let conf = Configuration::new();
    assert_eq!(conf.default_fs(), "file:///");
    assert_eq!(conf.get_u64(keys::LOCAL_BLOCK_SIZE, 0)?, 32 * 1024 * 1024);
    assert_eq!(conf.get_usize(keys::IO_FILE_BUFFER_SIZE, 0)?, 65536);
    assert!(!conf.get_bool(keys::INPUT_DIR_RECURSIVE, true)?);
    assert!(conf.get(keys::RECORD_DELIMITER).is_none());
    assert!(conf.resources().is_empty());
    Ok(())
}

#[test]
fn test_later_resources_override_unless_final() -> Result<()> {
    let dir = TempDirPath::new()?;
    write_site(
        dir.path(),
        "core-site.xml",
        &[
            (keys::DEFAULT_FS, "hdfs://namenode:8020", true),
            (keys::IO_FILE_BUFFER_SIZE, "4096", false),
        ],
    )?;
    write_site(
        dir.path(),
        "hdfs-site.xml",
        &[
            (keys::DEFAULT_FS, "file:///", false),
            (keys::IO_FILE_BUFFER_SIZE, "8192", false),
        ],
    )?;

    let conf = Configuration::builder()
        .application_dir(dir.path())
        .add_resource("core-site.xml")
        .add_resource("hdfs-site.xml")
        .build()?;
    assert_eq!(conf.default_fs(), "hdfs://namenode:8020");
    assert_eq!(conf.get_usize(keys::IO_FILE_BUFFER_SIZE, 0)?, 8192);
    assert_eq!(conf.resources().len(), 2);
    Ok(())
}

#[test]
fn test_programmatic_values_apply_last() -> Result<()> {
    let dir = TempDirPath::new()?;
    write_site(dir.path(), "site.xml", &[(keys::SPLIT_MINSIZE, "10", true)])?;
    let conf = Configuration::builder()
        .application_dir(dir.path())
        .add_resource("site.xml")
        .set(keys::SPLIT_MINSIZE, "20")
        .build()?;
    assert_eq!(conf.get_u64(keys::SPLIT_MINSIZE, 0)?, 20);
    Ok(())
}

#[test]
fn test_variable_expansion() -> Result<()> {
    let conf = Configuration::builder()
        .set("base.dir", "/data")
        .set("logs.dir", "${base.dir}/logs")
        .set("today.dir", "${logs.dir}/today")
        .set("unknown", "${no.such.key}/x")
        .set("loop", "${loop}")
        .build()?;
    assert_eq!(conf.get("today.dir").as_deref(), Some("/data/logs/today"));
    assert_eq!(conf.get_raw("today.dir"), Some("${logs.dir}/today"));
    assert_eq!(conf.get("unknown").as_deref(), Some("${no.such.key}/x"));
    // Self references stop at the substitution limit instead of looping.
    assert_eq!(conf.get("loop").as_deref(), Some("${loop}"));

    if let Ok(path) = std::env::var("PATH") {
        let conf = Configuration::builder().set("p", "${env.PATH}").build()?;
        assert_eq!(conf.get("p"), Some(path));
    }
    Ok(())
}

#[test]
fn test_typed_getters_reject_garbage() -> Result<()> {
    let conf = Configuration::builder()
        .set(keys::SPLIT_MAXSIZE, "lots")
        .set(keys::INPUT_DIR_RECURSIVE, "maybe")
        .build()?;
    assert!(matches!(
        conf.get_u64(keys::SPLIT_MAXSIZE, 0),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        conf.get_bool(keys::INPUT_DIR_RECURSIVE, false),
        Err(Error::Config(_))
    ));
    assert_eq!(conf.get_u64("unset.key", 7)?, 7);
    Ok(())
}

#[test]
fn test_missing_resource_names_its_location() -> Result<()> {
    let dir = TempDirPath::new()?;
    let err = Configuration::builder()
        .application_dir(dir.path())
        .add_resource("etc/core-site.xml")
        .build()
        .unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, Error::Config(_)));
    assert!(msg.contains("Specified configuration file etc/core-site.xml not found"));
    assert!(msg.contains(&dir.file_path("etc/core-site.xml").display().to_string()));
    Ok(())
}

#[test]
fn test_malformed_resource() -> Result<()> {
    let dir = TempDirPath::new()?;
    std::fs::write(dir.file_path("bad.xml"), "<configuration><property>")?;
    let err = Configuration::builder()
        .application_dir(dir.path())
        .add_resource("bad.xml")
        .build()
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    Ok(())
}

#[test]
fn test_parse_resource_skips_valueless_properties() -> Result<()> {
    let xml = "<configuration>\
        <property><name> a </name><value> 1 </value><final>TRUE</final></property>\
        <property><name>b</name></property>\
        <property><name>c</name><value>3</value></property>\
        </configuration>";
    let props = parse_resource(xml, "inline")?;
    assert_eq!(
        props,
        vec![
            ("a".to_string(), "1".to_string(), true),
            ("c".to_string(), "3".to_string(), false),
        ]
    );
    Ok(())
}

#[test]
fn test_resource_path_resolution() {
    let app = Path::new("/opt/app");
    assert_eq!(
        resolve_resource_path("etc/core-site.xml", app),
        Path::new("/opt/app/etc/core-site.xml")
    );
    assert_eq!(
        resolve_resource_path("/etc/hadoop/core-site.xml", app),
        Path::new("/etc/hadoop/core-site.xml")
    );
}

#[test]
fn test_resources_reach_the_reader() -> Result<()> {
    let dir = TempDirPath::new()?;
    write_site(
        dir.path(),
        "core-site.xml",
        &[
            (keys::DEFAULT_FS, "mem:///", false),
            (keys::RECORD_DELIMITER, ";", false),
        ],
    )?;
    let fs = mock_memory_fs(&[("/in/a.txt", b"a;b;c")], 1024);
    let ctx = OperatorContext::new("conf")
        .application_dir(dir.path())
        .register_filesystem(fs);
    let sink = ironsplit::CollectingSink::new();
    let mut reader = InputFormatReader::initialize(
        // Scheme-less input resolves against the configured default filesystem.
        ReaderParams::new(["/in/a.txt"]).config_resource("core-site.xml"),
        &ctx,
        vec![OutputPort::new(key_value_schema(), sink.clone())],
    )?;
    assert_eq!(reader.configuration().default_fs(), "mem:///");
    assert_eq!(reader.splits()[0].path.to_string(), "mem:///in/a.txt");
    reader.all_ports_ready()?;
    reader.join()?;
    assert_eq!(
        key_values_of(&sink.items()),
        vec![
            (0, "a".to_string()),
            (2, "b".to_string()),
            (4, "c".to_string())
        ]
    );
    Ok(())
}
