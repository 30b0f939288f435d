use bytes::Bytes;
use staticd::cache::ResponseCache;
use staticd::config::CacheConfig;
use staticd::files::StaticFiles;
use staticd::server::ConnectionId;
use staticd::server::worker::{InboundSegment, ResponseSink, Worker, WorkerMessage, WorkerPool};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Default)]
struct RecordingSink {
    sent: Arc<Mutex<Vec<(ConnectionId, Bytes)>>>,
    closed: Arc<Mutex<Vec<ConnectionId>>>,
}

impl ResponseSink for RecordingSink {
    fn send(&self, conn: ConnectionId, data: Bytes) {
        self.sent.lock().unwrap().push((conn, data));
    }

    fn close(&self, conn: ConnectionId) {
        self.closed.lock().unwrap().push(conn);
    }
}

impl RecordingSink {
    fn for_conn(&self, conn: ConnectionId) -> Vec<Bytes> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, b)| b.clone())
            .collect()
    }

    fn wait_for(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.sent.lock().unwrap().len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for output");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

fn files() -> (tempfile::TempDir, Arc<StaticFiles>) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    std::fs::write(dir.path().join("b.txt"), "bravo").unwrap();
    let cache = Arc::new(ResponseCache::new(&CacheConfig::default()));
    let files = Arc::new(StaticFiles::new(dir.path(), cache, false));
    (dir, files)
}

fn worker(files: Arc<StaticFiles>, sink: RecordingSink) -> Worker<RecordingSink> {
    let (_tx, rx) = crossbeam_channel::unbounded();
    Worker::new(0, rx, files, sink, 64 * 1024)
}

fn segment(conn: usize, data: &'static [u8]) -> WorkerMessage {
    WorkerMessage::Segment(InboundSegment {
        conn: ConnectionId(conn),
        data: Bytes::from_static(data),
    })
}

#[test]
fn test_interleaved_partial_headers_on_one_worker() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let mut worker = worker(files, sink.clone());

    worker.handle(segment(1, b"GET /a.t"));
    worker.handle(segment(2, b"GET /b.txt HTTP/1.1\r\n"));
    worker.handle(segment(1, b"xt HTTP/1.1\r\nHost: x\r\n"));
    assert!(sink.sent.lock().unwrap().is_empty());

    worker.handle(segment(2, b"\r\n"));
    let two = sink.for_conn(ConnectionId(2));
    assert_eq!(two.len(), 2);
    assert_eq!(&two[1][..], b"bravo");
    assert!(sink.for_conn(ConnectionId(1)).is_empty());

    worker.handle(segment(1, b"\r\n"));
    let one = sink.for_conn(ConnectionId(1));
    assert_eq!(one.len(), 2);
    assert!(one[0].starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert_eq!(&one[1][..], b"alpha");
}

#[test]
fn test_head_sends_header_only() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let mut worker = worker(files, sink.clone());

    worker.handle(segment(1, b"HEAD /a.txt HTTP/1.1\r\n\r\n"));

    let sent = sink.for_conn(ConnectionId(1));
    assert_eq!(sent.len(), 1);
    assert!(sent[0].windows(17).any(|w| w == b"Content-Length: 5"));
}

#[test]
fn test_missing_file_then_keep_serving() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let mut worker = worker(files, sink.clone());

    worker.handle(segment(1, b"GET /missing HTTP/1.1\r\n\r\nGET /a.txt HTTP/1.1\r\n\r\n"));

    let sent = sink.for_conn(ConnectionId(1));
    assert_eq!(sent.len(), 3);
    assert!(sent[0].starts_with(b"HTTP/1.1 404 Not Found\r\n"));
    assert!(sent[1].starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert_eq!(&sent[2][..], b"alpha");
}

#[test]
fn test_malformed_request_gets_500() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let mut worker = worker(files, sink.clone());

    worker.handle(segment(4, b"NONSENSE\r\n\r\n"));

    let sent = sink.for_conn(ConnectionId(4));
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with(b"HTTP/1.1 500 Internal Server Error\r\n"));
}

#[test]
fn test_close_drops_request_state() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let mut worker = worker(files, sink.clone());

    worker.handle(segment(1, b"GET /a.txt HT"));
    worker.handle(segment(2, b"GET /b.txt HT"));
    assert_eq!(worker.tracked(), 2);

    worker.handle(WorkerMessage::Closed(ConnectionId(1)));
    assert_eq!(worker.tracked(), 1);
}

#[test]
fn test_pool_assignment_is_stable() {
    let (_dir, files) = files();
    let pool = WorkerPool::spawn(3, files, RecordingSink::default(), 1024).unwrap();

    assert_eq!(pool.len(), 3);
    for id in 0..20 {
        let conn = ConnectionId(id);
        let first = pool.worker_for(conn);
        assert!(first < 3);
        assert_eq!(first, pool.worker_for(conn));
    }
    assert!(!pool.dispatch(3, WorkerMessage::Closed(ConnectionId(1))));
}

#[test]
fn test_pool_preserves_segment_order() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let pool = WorkerPool::spawn(2, files, sink.clone(), 1024).unwrap();

    let conn = ConnectionId(5);
    let worker = pool.worker_for(conn);
    let request = b"GET /a.txt HTTP/1.1\r\n\r\n";

    // Three requests split into single bytes must still frame correctly.
    for _ in 0..3 {
        for byte in request.chunks(1) {
            let message = WorkerMessage::Segment(InboundSegment {
                conn,
                data: Bytes::copy_from_slice(byte),
            });
            assert!(pool.dispatch(worker, message));
        }
    }

    sink.wait_for(6);
    let sent = sink.for_conn(conn);
    for pair in sent.chunks(2) {
        assert!(pair[0].starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert_eq!(&pair[1][..], b"alpha");
    }
}

#[test]
fn test_overflowing_content_length_gets_500() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let mut worker = worker(files, sink.clone());

    worker.handle(segment(
        1,
        b"GET / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n",
    ));
    worker.handle(segment(1, b"GET /a.txt HTTP/1.1\r\n\r\n"));

    let sent = sink.for_conn(ConnectionId(1));
    assert_eq!(sent.len(), 3);
    assert!(sent[0].starts_with(b"HTTP/1.1 500 Internal Server Error\r\n"));
    assert!(sent[1].starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert_eq!(&sent[2][..], b"alpha");
}

#[test]
fn test_worker_survives_bad_content_length() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let pool = WorkerPool::spawn(1, files, sink.clone(), 1024).unwrap();

    let bad = WorkerMessage::Segment(InboundSegment {
        conn: ConnectionId(1),
        data: Bytes::from_static(
            b"GET / HTTP/1.1\r\nContent-Length: 18446744073709551615\r\n\r\n",
        ),
    });
    assert!(pool.dispatch(0, bad));
    sink.wait_for(1);

    // Same worker, another connection.
    let good = WorkerMessage::Segment(InboundSegment {
        conn: ConnectionId(2),
        data: Bytes::from_static(b"GET /b.txt HTTP/1.1\r\n\r\n"),
    });
    assert!(pool.dispatch(0, good));
    sink.wait_for(3);

    let sent = sink.for_conn(ConnectionId(2));
    assert!(sent[0].starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert_eq!(&sent[1][..], b"bravo");
}

#[test]
fn test_huge_declared_body_gets_500() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let mut worker = worker(files, sink.clone());

    worker.handle(segment(
        3,
        b"POST /a.txt HTTP/1.1\r\nContent-Length: 100000000000\r\n\r\npartial",
    ));

    let sent = sink.for_conn(ConnectionId(3));
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with(b"HTTP/1.1 500 Internal Server Error\r\n"));
    assert_eq!(worker.tracked(), 1);
}

#[test]
fn test_connection_close_is_honoured() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let mut worker = worker(files, sink.clone());

    worker.handle(segment(
        6,
        b"GET /a.txt HTTP/1.1\r\nConnection: close\r\n\r\nGET /b.txt HTTP/1.1\r\n\r\n",
    ));
    worker.handle(segment(6, b"GET /b.txt HTTP/1.1\r\n\r\n"));

    let sent = sink.for_conn(ConnectionId(6));
    assert_eq!(sent.len(), 2);
    assert_eq!(&sent[1][..], b"alpha");
    assert_eq!(*sink.closed.lock().unwrap(), vec![ConnectionId(6)]);
    assert_eq!(worker.tracked(), 0);

    // Once the reactor reports the close, the id is forgotten entirely.
    worker.handle(WorkerMessage::Closed(ConnectionId(6)));
    assert_eq!(worker.tracked(), 0);
}

#[test]
fn test_other_methods_are_answered_like_head() {
    let (_dir, files) = files();
    let sink = RecordingSink::default();
    let mut worker = worker(files, sink.clone());

    worker.handle(segment(7, b"DELETE /a.txt HTTP/1.1\r\n\r\n"));

    let sent = sink.for_conn(ConnectionId(7));
    assert_eq!(sent.len(), 1);
    assert!(sent[0].starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(sent[0].windows(17).any(|w| w == b"Content-Length: 5"));
}
