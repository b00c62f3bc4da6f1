//! Reader operator lifecycle and emitted streams.

use anyhow::Result;
use ironsplit::testing::*;
use ironsplit::{
    AttributeType, CollectingSink, Error, FileType, InputFormatReader, MemoryFileSystem,
    OperatorContext, OutputPort, Punctuation, ReaderParams, ReaderState, StreamItem, StreamSchema,
};
use std::io::Write;
use std::sync::{Arc, Mutex};

fn mem_ctx(files: &[(&str, &[u8])], block_size: u64) -> (OperatorContext, Arc<MemoryFileSystem>) {
    let fs = mock_memory_fs(files, block_size);
    let ctx = OperatorContext::new("reader").register_filesystem(fs.clone());
    (ctx, fs)
}

fn init(
    params: ReaderParams,
    ctx: &OperatorContext,
    schema: StreamSchema,
) -> ironsplit::Result<(InputFormatReader, CollectingSink)> {
    let sink = CollectingSink::new();
    let reader =
        InputFormatReader::initialize(params, ctx, vec![OutputPort::new(schema, sink.clone())])?;
    Ok((reader, sink))
}

fn run_to_end(
    params: ReaderParams,
    ctx: &OperatorContext,
    schema: StreamSchema,
) -> ironsplit::Result<Vec<StreamItem>> {
    let (mut reader, sink) = init(params, ctx, schema)?;
    reader.all_ports_ready()?;
    reader.join()?;
    Ok(sink.items())
}

#[test]
fn test_single_channel_three_lines() -> Result<()> {
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"alpha\nbeta\ngamma\n")], 1024);
    let items = run_to_end(
        ReaderParams::new(["mem:///in/a.txt"]),
        &ctx,
        key_value_schema(),
    )?;
    assert_stream_shape(&items, &[3]);
    assert_eq!(
        key_values_of(&items),
        vec![
            (0, "alpha".to_string()),
            (6, "beta".to_string()),
            (11, "gamma".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn test_two_channels_take_even_and_odd_splits() -> Result<()> {
    let files: Vec<(String, Vec<u8>)> = (0..5)
        .map(|i| (format!("/in/f{i}.txt"), format!("file {i}\n").into_bytes()))
        .collect();
    let refs: Vec<(&str, &[u8])> = files
        .iter()
        .map(|(p, d)| (p.as_str(), d.as_slice()))
        .collect();
    let (ctx, _) = mem_ctx(&refs, 1024);
    let params = ReaderParams::new(["mem:///in"]);

    let single = run_channels(&params, &ctx, &key_value_schema(), 1)?;
    let pair = run_channels(&params, &ctx, &key_value_schema(), 2)?;

    assert_stream_shape(&pair[0], &[1, 1, 1]);
    assert_stream_shape(&pair[1], &[1, 1]);
    let values = |items: &[StreamItem]| -> Vec<String> {
        key_values_of(items).into_iter().map(|(_, v)| v).collect()
    };
    assert_eq!(values(&pair[0]), vec!["file 0", "file 2", "file 4"]);
    assert_eq!(values(&pair[1]), vec!["file 1", "file 3"]);
    assert_eq!(
        key_values_of(&merge_by_split(&pair)),
        key_values_of(&single[0])
    );
    Ok(())
}

#[test]
fn test_channel_without_splits_emits_only_final_marker() -> Result<()> {
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"only\n")], 1024);
    let channels = run_channels(
        &ReaderParams::new(["mem:///in/a.txt"]),
        &ctx,
        &key_value_schema(),
        3,
    )?;
    assert_stream_shape(&channels[0], &[1]);
    for idle in &channels[1..] {
        assert_eq!(idle.len(), 1);
        assert!(idle[0].is_punctuation(Punctuation::FinalMarker));
    }
    Ok(())
}

#[test]
fn test_key_only_and_value_only_projection() -> Result<()> {
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"x\nyy\n")], 1024);
    let params = ReaderParams::new(["mem:///in/a.txt"]);

    let keys = run_to_end(params.clone(), &ctx, key_only_schema())?;
    assert_eq!(records_of(&keys), vec![(Some(0), None), (Some(2), None)]);

    let values = run_to_end(params.clone(), &ctx, value_only_schema())?;
    assert_eq!(
        records_of(&values),
        vec![(None, Some("x".to_string())), (None, Some("yy".to_string()))]
    );

    let ustring = StreamSchema::parse("tuple<ustring value, int64 key>")?;
    let both = run_to_end(params, &ctx, ustring)?;
    assert_eq!(
        key_values_of(&both),
        vec![(0, "x".to_string()), (2, "yy".to_string())]
    );
    Ok(())
}

#[test]
fn test_schema_without_key_or_value_fails_before_start() {
    let (ctx, fs) = mem_ctx(&[("/in/a.txt", b"x\n")], 1024);
    let schema = StreamSchema::new().with("line", AttributeType::RString);
    let err = init(ReaderParams::new(["mem:///in/a.txt"]), &ctx, schema).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "unexpected error: {err}");
    assert_eq!(fs.open_handles(), 0);
}

#[test]
fn test_wrongly_typed_attributes_violate_the_contract() {
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"x\n")], 1024);
    for schema in [
        StreamSchema::new().with("key", AttributeType::RString),
        StreamSchema::new().with("value", AttributeType::Int64),
        StreamSchema::new()
            .with("key", AttributeType::Int32)
            .with("value", AttributeType::RString),
    ] {
        let err = init(ReaderParams::new(["mem:///in/a.txt"]), &ctx, schema).unwrap_err();
        assert!(matches!(err, Error::TypeContract(_)), "unexpected error: {err}");
    }
}

#[test]
fn test_exactly_one_output_port() {
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"x\n")], 1024);
    let err = InputFormatReader::initialize(ReaderParams::new(["mem:///in/a.txt"]), &ctx, vec![])
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_missing_input_fails_initialization() {
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"x\n")], 1024);
    let err = init(
        ReaderParams::new(["mem:///in/nope.txt"]),
        &ctx,
        key_value_schema(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn test_missing_config_resource_fails_initialization() -> Result<()> {
    let dir = TempDirPath::new()?;
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"x\n")], 1024);
    let ctx = ctx.application_dir(dir.path());
    let err = init(
        ReaderParams::new(["mem:///in/a.txt"]).config_resource("core-site.xml"),
        &ctx,
        key_value_schema(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(format!("{err}").contains("core-site.xml"));
    Ok(())
}

/// Log lines at `warn` and above emitted on this thread while `f` runs.
fn captured_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buf = Arc::new(Mutex::new(Vec::new()));
    let writer_buf = Arc::clone(&buf);
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || CapturedWriter(Arc::clone(&writer_buf)))
        .finish();
    let out = tracing::subscriber::with_default(subscriber, f);
    let logged = String::from_utf8_lossy(&buf.lock().unwrap()).into_owned();
    (out, logged)
}

struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

impl Write for CapturedWriter {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_non_hdfs_default_with_resources_warns_but_initializes() -> Result<()> {
    let dir = TempDirPath::new()?;
    std::fs::write(
        dir.file_path("core-site.xml"),
        "<configuration><property><name>fs.defaultFS</name>\
         <value>file:///</value></property></configuration>",
    )?;
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"x\ny\n")], 1024);
    let ctx = ctx.application_dir(dir.path());

    let (reader, logged) = captured_warnings(|| {
        init(
            ReaderParams::new(["mem:///in/a.txt"]).config_resource("core-site.xml"),
            &ctx,
            key_value_schema(),
        )
    });
    let (mut reader, sink) = reader?;
    assert!(logged.contains("WARN"), "nothing logged: {logged:?}");
    assert!(logged.contains("Default file system is not HDFS"));
    assert!(logged.contains("file:///"));

    reader.all_ports_ready()?;
    reader.join()?;
    assert_stream_shape(&sink.items(), &[2]);
    Ok(())
}

#[test]
fn test_no_resources_means_no_filesystem_warning() -> Result<()> {
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"x\n")], 1024);
    let (reader, logged) =
        captured_warnings(|| init(ReaderParams::new(["mem:///in/a.txt"]), &ctx, key_value_schema()));
    reader?;
    assert!(logged.is_empty(), "unexpected warnings: {logged}");
    Ok(())
}

#[test]
fn test_channel_out_of_range_is_rejected() {
    let (ctx, _) = mem_ctx(&[("/in/a.txt", b"x\n")], 1024);
    let err = init(
        ReaderParams::new(["mem:///in/a.txt"]),
        &ctx.with_channel(2, 2),
        key_value_schema(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_file_type_parsing() -> Result<()> {
    assert_eq!("TEXT".parse::<FileType>()?, FileType::Text);
    assert_eq!("sequence".parse::<FileType>()?, FileType::Sequence);
    assert!(matches!("avro".parse::<FileType>(), Err(Error::Config(_))));
    Ok(())
}

#[test]
fn test_nothing_is_read_before_ports_are_ready() -> Result<()> {
    let (ctx, fs) = mem_ctx(&[("/in/a.txt", b"one\ntwo\n")], 4);
    let (mut reader, sink) = init(
        ReaderParams::new(["mem:///in/a.txt"]),
        &ctx,
        key_value_schema(),
    )?;
    assert_eq!(reader.state(), ReaderState::Initializing);
    assert_eq!(reader.splits().len(), 2);
    assert_eq!(reader.assigned_splits().len(), 2);
    assert!(sink.items().is_empty());
    assert_eq!(fs.open_handles(), 0);

    reader.all_ports_ready()?;
    reader.join()?;
    assert_eq!(reader.state(), ReaderState::Terminated);
    // "two" starts exactly at the first split's end, so the first split owns it.
    assert_stream_shape(&sink.items(), &[2, 0]);
    assert_eq!(fs.open_handles(), 0);
    Ok(())
}

#[test]
fn test_every_channel_sees_the_same_split_list() -> Result<()> {
    let data = vec![b'x'; 100];
    let (ctx, _) = mem_ctx(&[("/in/a.txt", &data)], 10);
    let params = ReaderParams::new(["mem:///in/a.txt"]);
    let mut all = Vec::new();
    for c in 0..3 {
        let (reader, _) = init(params.clone(), &ctx.clone().with_channel(c, 3), key_value_schema())?;
        let assigned: Vec<usize> = reader.assigned_splits().iter().map(|s| s.index).collect();
        assert!(assigned.iter().all(|i| i % 3 == c));
        all.push((reader.splits().to_vec(), assigned));
    }
    assert!(all.windows(2).all(|w| w[0].0 == w[1].0));
    let mut covered: Vec<usize> = all.iter().flat_map(|(_, a)| a.clone()).collect();
    covered.sort_unstable();
    assert_eq!(covered, (0..all[0].0.len()).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_read_failure_ends_the_channel() -> Result<()> {
    let lines = numbered_lines(100);
    let data: Vec<u8> = lines.iter().flat_map(|l| format!("{l}\n").into_bytes()).collect();
    let (ctx, fs) = mem_ctx(&[("/in/a.txt", &data)], 1 << 20);
    fs.fail_reads_after("/in/a.txt", 200);

    let (mut reader, sink) = init(
        ReaderParams::new(["mem:///in/a.txt"]),
        &ctx,
        key_value_schema(),
    )?;
    reader.all_ports_ready()?;
    let err = reader.join().unwrap_err();
    assert!(matches!(err, Error::Io { .. }), "unexpected error: {err}");
    assert_eq!(reader.state(), ReaderState::Terminated);
    assert!(
        !sink
            .items()
            .iter()
            .any(|i| i.is_punctuation(Punctuation::FinalMarker))
    );
    assert_eq!(fs.open_handles(), 0);
    Ok(())
}

#[test]
fn test_sequence_file_through_the_operator() -> Result<()> {
    let recs: Vec<(i64, String)> = (0..10).map(|i| (i, format!("v{i}"))).collect();
    let bytes = sequence_file_bytes(&recs)?;
    let (ctx, _) = mem_ctx(&[("/in/part-0", &bytes)], 1 << 20);
    let items = run_to_end(
        ReaderParams::new(["mem:///in/part-0"]).file_type(FileType::Sequence),
        &ctx,
        key_value_schema(),
    )?;
    assert_stream_shape(&items, &[10]);
    assert_eq!(key_values_of(&items), recs);
    Ok(())
}
