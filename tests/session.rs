use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use dfs_util::{
    error::Error,
    report::{Outcome, Reporter},
    store::{Capabilities, LocalConnector, MemoryCluster, MemoryConnector},
    Endpoint, FileStoreClient, Session, MAX_RECORD_LEN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Done,
    Declined,
    Failed,
}

#[derive(Default)]
struct Recorder {
    lines: Mutex<Vec<(String, String, Kind)>>,
}

impl Recorder {
    fn lines(&self) -> Vec<(String, String, Kind)> {
        self.lines.lock().unwrap().clone()
    }

    fn count(&self, kind: Kind) -> usize {
        self.lines().iter().filter(|(_, _, k)| *k == kind).count()
    }

    fn last(&self) -> (String, String, Kind) {
        self.lines().last().cloned().unwrap()
    }
}

impl Reporter for Recorder {
    fn report(&self, op: &str, target: &str, outcome: Outcome<'_>) {
        let kind = match outcome {
            Outcome::Done => Kind::Done,
            Outcome::Declined => Kind::Declined,
            Outcome::Failed(_) => Kind::Failed,
        };
        self.lines
            .lock()
            .unwrap()
            .push((op.to_owned(), target.to_owned(), kind));
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn client_for(cluster: MemoryCluster) -> (FileStoreClient, Arc<Recorder>) {
    init_logger();
    let connector = MemoryConnector::new();
    connector.register("namenode", 8020, Arc::new(cluster));

    let recorder = Arc::new(Recorder::default());
    let client = FileStoreClient::new()
        .register("hdfs", connector)
        .with_reporter(recorder.clone());
    (client, recorder)
}

async fn connect(cluster: MemoryCluster) -> (Session, Arc<Recorder>) {
    let (client, recorder) = client_for(cluster);
    let session = client.connect("namenode", 8020).await.unwrap();
    (session, recorder)
}

#[tokio::test]
async fn bad_host_fails_with_one_error_line() {
    let (client, recorder) = client_for(MemoryCluster::new());

    let result = client.connect("no-such-host", 8020).await;
    assert!(matches!(result, Err(Error::Connection { .. })));

    assert_eq!(recorder.lines().len(), 1);
    assert_eq!(recorder.count(Kind::Failed), 1);
    let (op, target, _) = recorder.last();
    assert_eq!(op, "connect");
    assert_eq!(target, "hdfs://no-such-host:8020");
}

#[tokio::test]
async fn mkdirs_then_rmdirs_twice() {
    let (session, recorder) = connect(MemoryCluster::new()).await;

    assert!(session.mkdirs("a/b/c").await.unwrap());
    assert!(session.mkdirs("a/b/c").await.unwrap());
    assert!(session.exists("a/b/c").await.unwrap());

    assert!(session.rmdirs("a").await.unwrap());
    assert!(!session.exists("a/b").await.unwrap());

    assert!(!session.rmdirs("a").await.unwrap());
    assert_eq!(
        recorder.last(),
        ("rmdirs".to_owned(), "/user/hdfs/a".to_owned(), Kind::Declined)
    );
    assert_eq!(recorder.count(Kind::Failed), 0);
}

#[tokio::test]
async fn write_then_read() {
    let (session, recorder) = connect(MemoryCluster::new()).await;

    session.write("greeting", "hello").await.unwrap();
    assert_eq!(session.read("greeting").await.unwrap(), "hello");

    // a second write replaces the content
    session.write("greeting", "héllo \u{1F600}").await.unwrap();
    assert_eq!(session.read_records("greeting").await.unwrap(), vec!["héllo \u{1F600}"]);

    // connect, then two writes and two reads
    assert_eq!(recorder.count(Kind::Done), 5);
}

#[tokio::test]
async fn appends_are_separate_records() {
    let (session, _) = connect(MemoryCluster::new()).await;
    let local = tempfile::NamedTempFile::new().unwrap();
    session.upload(local.path(), "journal").await.unwrap();

    session.append("journal", "a").await.unwrap();
    session.append("journal", "b").await.unwrap();

    let records = session.read_records("journal").await.unwrap();
    assert_eq!(records, vec!["a".to_owned(), "b".to_owned()]);
    assert_eq!(session.read("journal").await.unwrap(), "a");
    assert_eq!(session.status("journal").await.unwrap().len, 6);
}

#[tokio::test]
async fn append_needs_store_support() {
    let (session, recorder) =
        connect(MemoryCluster::new().with_capabilities(Capabilities::empty())).await;
    session.write("journal", "a").await.unwrap();

    let err = session.append("journal", "b").await.unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert_eq!(recorder.last().2, Kind::Failed);
    assert_eq!(session.read_records("journal").await.unwrap(), vec!["a"]);
}

#[tokio::test]
async fn missing_file_is_reported_not_found() {
    let (session, recorder) = connect(MemoryCluster::new()).await;

    let err = session.read("nothing").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        recorder.last(),
        ("read".to_owned(), "/user/hdfs/nothing".to_owned(), Kind::Failed)
    );

    let err = session.append("nothing", "x").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn failed_write_releases_the_file() {
    let (session, _) = connect(MemoryCluster::new()).await;

    let too_long = "x".repeat(MAX_RECORD_LEN + 1);
    let err = session.write("big", &too_long).await.unwrap_err();
    assert!(matches!(err, Error::Framing(_)));

    session.write("big", "fits").await.unwrap();
    assert_eq!(session.read("big").await.unwrap(), "fits");
}

#[tokio::test]
async fn rooted_paths_are_used_as_given() {
    let (session, _) = connect(MemoryCluster::new()).await;

    session.write("/abs/data", "x").await.unwrap();
    assert_eq!(session.status("/abs/data").await.unwrap().path.as_str(), "/abs/data");
    assert!(!session.exists("abs/data").await.unwrap());
    assert!(session.exists("hdfs://namenode:8020/abs/data").await.unwrap());
}

fn local_tree() -> (tempfile::TempDir, HashMap<String, usize>) {
    let dir = tempfile::tempdir().unwrap();
    let files = [
        ("top.txt", 10),
        ("a/one.bin", 2 * 1024 * 1024 + 5),
        ("a/b/two.txt", 1500),
        ("a/b/c/three.txt", 0),
        ("d/four.bin", 1024 * 1024 - 1),
    ];

    let mut sizes = HashMap::new();
    for (name, len) in files {
        let path = dir.path().join("tree").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, vec![7u8; len]).unwrap();
        let _ = sizes.insert(format!("/user/hdfs/tree/{name}"), len);
    }
    std::fs::create_dir_all(dir.path().join("tree").join("empty")).unwrap();
    (dir, sizes)
}

#[tokio::test]
async fn walk_yields_each_file_once_with_sizes() {
    let (session, recorder) = connect(MemoryCluster::new()).await;
    let (local, sizes) = local_tree();
    session.upload(local.path().join("tree"), "tree").await.unwrap();

    let files = session.list_files("tree").await.unwrap();
    assert_eq!(files.len(), sizes.len());
    for file in &files {
        let len = sizes[file.path.as_str()];
        assert_eq!(file.len, len as u64);
        assert_eq!(file.human_size().unwrap(), dfs_util::convert_size(len as i64).unwrap());
    }

    let all = session.walk("tree").unwrap().collect().await.unwrap();
    let unique: HashSet<_> = all.iter().map(|e| e.path.clone()).collect();
    assert_eq!(unique.len(), all.len());
    // five files plus a, a/b, a/b/c, d and empty
    assert_eq!(all.len(), 10);
    assert_eq!(recorder.last(), ("walk".to_owned(), "/user/hdfs/tree".to_owned(), Kind::Done));
}

#[tokio::test]
async fn walk_can_restart() {
    let (session, _) = connect(MemoryCluster::new()).await;
    let (local, _) = local_tree();
    session.upload(local.path().join("tree"), "tree").await.unwrap();

    let mut walk = session.walk("tree").unwrap();
    let first = walk.next_entry().await.unwrap().unwrap();
    while walk.next_entry().await.unwrap().is_some() {}
    assert!(walk.next_entry().await.unwrap().is_none());

    walk.restart();
    assert_eq!(walk.next_entry().await.unwrap(), Some(first));
}

#[tokio::test]
async fn walk_of_missing_root_fails() {
    let (session, recorder) = connect(MemoryCluster::new()).await;
    let mut walk = session.walk("nope").unwrap();
    assert!(walk.next_entry().await.unwrap_err().is_not_found());
    assert_eq!(recorder.last().2, Kind::Failed);
}

#[tokio::test]
async fn deep_tree_walks_on_a_flat_stack() -> anyhow::Result<()> {
    let (session, _) = connect(MemoryCluster::new()).await;
    let chain = vec!["d"; 2000].join("/");
    session.write(&format!("deep/{chain}/leaf"), "bottom").await?;

    let files = session.list_files("deep").await?;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].name(), "leaf");

    let all = session.walk("deep")?.collect().await?;
    assert_eq!(all.len(), 2001);
    Ok(())
}

#[tokio::test]
async fn print_tree_lines() {
    let (session, _) = connect(MemoryCluster::new()).await;
    let (local, _) = local_tree();
    session.upload(local.path().join("tree"), "tree").await.unwrap();

    let mut out = Vec::new();
    let count = session.print_tree("tree", &mut out).await.unwrap();
    assert_eq!(count, 5);

    let text = String::from_utf8(out).unwrap();
    let mut lines: Vec<_> = text.lines().collect();
    lines.sort_unstable();
    assert_eq!(
        lines,
        vec![
            "0 KB\t/user/hdfs/tree/a/b/c/three.txt",
            "0 KB\t/user/hdfs/tree/top.txt",
            "1 KB\t/user/hdfs/tree/a/b/two.txt",
            "1023 KB\t/user/hdfs/tree/d/four.bin",
            "2 MB\t/user/hdfs/tree/a/one.bin",
        ]
    );
}

#[tokio::test]
async fn upload_into_existing_directory_and_download_back() {
    let (session, _) = connect(MemoryCluster::new()).await;
    let (local, _) = local_tree();

    assert!(session.mkdirs("backup").await.unwrap());
    session.upload(local.path().join("tree"), "backup").await.unwrap();
    assert!(session.exists("backup/tree/a/b/two.txt").await.unwrap());

    // uploading again overwrites in place
    session.upload(local.path().join("tree"), "backup").await.unwrap();
    assert_eq!(session.list("backup").await.unwrap().len(), 1);

    let out = tempfile::tempdir().unwrap();
    session.download(out.path(), "backup/tree").await.unwrap();
    let copied = std::fs::read(out.path().join("tree").join("a").join("b").join("two.txt")).unwrap();
    assert_eq!(copied, vec![7u8; 1500]);
    assert!(out.path().join("tree").join("empty").is_dir());

    // the source stays where it was
    assert!(local.path().join("tree").join("top.txt").exists());
}

#[tokio::test]
async fn download_of_missing_path_fails() {
    let (session, recorder) = connect(MemoryCluster::new()).await;
    let out = tempfile::tempdir().unwrap();

    assert!(session.download(out.path(), "missing").await.is_err());
    assert_eq!(recorder.last().0, "download");
    assert_eq!(recorder.last().2, Kind::Failed);
}

#[tokio::test]
async fn cluster_nodes_and_config() {
    let (session, _) = connect(MemoryCluster::new().with_datanodes(2)).await;

    let nodes = session.list_cluster_nodes().await.unwrap();
    let hosts: Vec<_> = nodes.iter().map(|n| n.hostname.as_str()).collect();
    assert_eq!(hosts, vec!["datanode-1", "datanode-2"]);

    let keys: Vec<_> = session.list_config().into_iter().map(|(k, _)| k).collect();
    assert_eq!(
        keys,
        vec!["fs.default.name", "dfs.user.name", "dfs.replication", "dfs.blocksize"]
    );

    let (plain, _) = connect(MemoryCluster::new().with_capabilities(Capabilities::APPEND)).await;
    assert!(matches!(plain.list_cluster_nodes().await, Err(Error::Unsupported(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn independent_sessions_run_side_by_side() -> anyhow::Result<()> {
    let (client, recorder) = client_for(MemoryCluster::new());
    let a = client.connect("namenode", 8020).await?;
    let b = client.connect("namenode", 8020).await?;

    let (ra, rb) = tokio::join!(
        async {
            for i in 0..20 {
                a.write(&format!("a/{i}"), "from a").await?;
            }
            Ok::<_, Error>(())
        },
        async {
            for i in 0..20 {
                b.write(&format!("b/{i}"), "from b").await?;
            }
            Ok::<_, Error>(())
        },
    );
    ra?;
    rb?;

    assert_eq!(a.list_files("b").await?.len(), 20);
    assert_eq!(b.read("a/7").await?, "from a");
    assert_eq!(recorder.count(Kind::Failed), 0);
    Ok(())
}

#[tokio::test]
async fn local_directory_store() {
    init_logger();
    let root = tempfile::tempdir().unwrap();
    let client = FileStoreClient::new().register("file", LocalConnector::new(root.path()));

    let session = client
        .connect_endpoint(&Endpoint::with_scheme("file", "localhost", 0))
        .await
        .unwrap();
    assert!(!session.is_serialized());

    session.write("note", "kept on disk").await.unwrap();
    session.append("note", "and more").await.unwrap();
    assert_eq!(
        session.read_records("note").await.unwrap(),
        vec!["kept on disk", "and more"]
    );
    assert!(root.path().join("user").join("hdfs").join("note").is_file());

    assert!(session.rmdirs("/user").await.unwrap());
    assert!(!session.rmdirs("/user").await.unwrap());
    session.close().await.unwrap();
}
