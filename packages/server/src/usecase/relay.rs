//! UseCase: Relay Task 管理
//!
//! ルームごとにインスタンス内で最大1つ動く Relay Task を管理します。
//! Relay Task はルームのブローカーチャンネルを購読し、受信した Envelope を
//! このインスタンスのローカル接続すべてにファンアウトします。
//!
//! ## ライフサイクル
//!
//! - `ensure_running` はロック内で check-then-act するため、同時入室でも
//!   タスクは1つしか生まれない。終了済みタスクの残骸は置き換えられる。
//! - 受信タイムアウト境界ごとにローカル接続の有無を確認し、誰も
//!   いなければ自律的に終了する。このときレジストリの確認と自分の
//!   取り外しをタスク表のロックの下で行うため、`ensure_running` が
//!   終了直前のタスクを生きていると誤認することはない。
//! - teardown は `stop_if_idle` を使う。同じロックの下でレジストリを
//!   確認し直すため、確認の合間に入室した接続のタスクを止めない。
//! - どの経路で終了しても購読は必ず close される。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::domain::{BrokerError, Envelope, MessageBroker, RoomId, RoomStore, Subscription};
use crate::infrastructure::ConnectionRegistry;

/// 受信待ちの上限。この間隔ごとに生存判断を行う。
const RELAY_POLL_INTERVAL: Duration = Duration::from_secs(1);

struct RelayHandle {
    /// タスク表のエントリとタスク本体を対応づける世代番号。
    /// タスクが自分の取り外しを行うとき、置き換え後のエントリを
    /// 誤って消さないために照合する。
    generation: u64,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// ルームごとの Relay Task を管理するユースケース
pub struct RoomRelay {
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn RoomStore>,
    broker: Arc<dyn MessageBroker>,
    poll_interval: Duration,
    tasks: Arc<Mutex<HashMap<String, RelayHandle>>>,
    next_generation: AtomicU64,
}

impl RoomRelay {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn RoomStore>,
        broker: Arc<dyn MessageBroker>,
    ) -> Self {
        Self::with_poll_interval(registry, store, broker, RELAY_POLL_INTERVAL)
    }

    /// 受信待ちの上限を指定して作成（テストで短縮するため）
    pub fn with_poll_interval(
        registry: Arc<ConnectionRegistry>,
        store: Arc<dyn RoomStore>,
        broker: Arc<dyn MessageBroker>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            store,
            broker,
            poll_interval,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// ルームの Relay Task が動いていることを保証する
    ///
    /// すでに生きているタスクがあれば何もしない。終了済みの残骸があれば
    /// 新しいタスクで置き換える。購読の確立に失敗した場合はエラーを返し、
    /// タスクは生まれない。
    pub async fn ensure_running(&self, room_id: &RoomId) -> Result<(), BrokerError> {
        let mut tasks = self.tasks.lock().await;
        if let Some(handle) = tasks.get(room_id.as_str()) {
            if !handle.task.is_finished() {
                return Ok(());
            }
        }

        // 購読はタスク起動前に確立する。以降に publish されたメッセージは
        // 取りこぼさない。
        let subscription = self.broker.subscribe(room_id.as_str()).await?;
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(relay_loop(
            room_id.as_str().to_string(),
            generation,
            subscription,
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            Arc::clone(&self.tasks),
            shutdown_rx,
            self.poll_interval,
        ));
        tasks.insert(
            room_id.as_str().to_string(),
            RelayHandle {
                generation,
                shutdown: shutdown_tx,
                task,
            },
        );
        tracing::info!("Relay task started for room '{}'", room_id.as_str());
        Ok(())
    }

    /// ルームの Relay Task を停止し、終了を待つ（冪等）
    pub async fn stop(&self, room_id: &str) {
        let handle = self.tasks.lock().await.remove(room_id);
        Self::shut_down(room_id, handle).await;
    }

    /// ローカル接続が残っていなければ Relay Task を停止する（冪等）
    ///
    /// レジストリの確認とタスクの取り外しを同じロックの下で行う。
    /// 確認の合間に入室した接続がいれば（その `ensure_running` は
    /// 生きているタスクを見て no-op になっている）停止を見送る。
    pub async fn stop_if_idle(&self, room_id: &str) {
        let handle = {
            let mut tasks = self.tasks.lock().await;
            if !self.registry.is_empty(room_id).await {
                return;
            }
            tasks.remove(room_id)
        };
        Self::shut_down(room_id, handle).await;
    }

    async fn shut_down(room_id: &str, handle: Option<RelayHandle>) {
        if let Some(handle) = handle {
            let _ = handle.shutdown.send(true);
            if let Err(e) = handle.task.await {
                tracing::warn!("Relay task for room '{}' panicked: {}", room_id, e);
            }
        }
    }

    /// ルームの Relay Task が生きているか
    pub async fn is_running(&self, room_id: &str) -> bool {
        let tasks = self.tasks.lock().await;
        tasks
            .get(room_id)
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// 生きている Relay Task の数
    pub async fn live_count(&self) -> usize {
        let tasks = self.tasks.lock().await;
        tasks
            .values()
            .filter(|handle| !handle.task.is_finished())
            .count()
    }
}

/// Relay Task の本体
async fn relay_loop(
    room_id: String,
    generation: u64,
    mut subscription: Box<dyn Subscription>,
    registry: Arc<ConnectionRegistry>,
    store: Arc<dyn RoomStore>,
    tasks: Arc<Mutex<HashMap<String, RelayHandle>>>,
    mut shutdown_rx: watch::Receiver<bool>,
    poll_interval: Duration,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::debug!("Relay task for room '{}' received shutdown signal", room_id);
                break;
            }
            received = subscription.recv(poll_interval) => match received {
                Ok(Some(payload)) => {
                    dispatch(&room_id, &payload, &registry, store.as_ref()).await;
                }
                Ok(None) => {
                    // タイムアウト境界。ローカル接続の確認と自分の取り外しを
                    // タスク表のロックの下で行う。確認後に入室した接続の
                    // `ensure_running` は、取り外し前なら生きているエントリを
                    // 見て no-op（その register によりここの確認は非空になる）、
                    // 取り外し後ならエントリ無しを見て新タスクを起動する。
                    let mut tasks_guard = tasks.lock().await;
                    if registry.is_empty(&room_id).await {
                        if tasks_guard
                            .get(&room_id)
                            .is_some_and(|handle| handle.generation == generation)
                        {
                            tasks_guard.remove(&room_id);
                        }
                        drop(tasks_guard);
                        tracing::debug!(
                            "Relay task for room '{}' has no local connections, exiting",
                            room_id
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Relay task for room '{}' lost its subscription: {}", room_id, e);
                    break;
                }
            }
        }
    }

    subscription.close().await;
    tracing::info!("Relay task stopped for room '{}'", room_id);
}

/// 1つのペイロードをローカル接続にファンアウトする
async fn dispatch(
    room_id: &str,
    payload: &str,
    registry: &ConnectionRegistry,
    store: &dyn RoomStore,
) {
    // 不正なペイロードはこのメッセージだけスキップし、タスクは続行する
    let envelope = match serde_json::from_str::<Envelope>(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Dropping malformed payload in room '{}': {}", room_id, e);
            return;
        }
    };

    let connections = registry.snapshot(room_id).await;
    let mut broken: Vec<String> = Vec::new();
    for (connection_id, sender) in &connections {
        if sender.send(payload.to_string()).is_err() {
            broken.push(connection_id.clone());
        }
    }
    tracing::debug!(
        "Relayed '{}' envelope to {} connections in room '{}'",
        envelope.kind_label(),
        connections.len() - broken.len(),
        room_id
    );

    // 送信に失敗した接続は死んでいる。反復の外でまとめて片付ける。
    for connection_id in broken {
        registry.deregister(room_id, &connection_id).await;
        if let Err(e) = store.remove_member(room_id, &connection_id).await {
            tracing::warn!(
                "Failed to remove stale member '{}' from room '{}': {}",
                connection_id,
                room_id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionIdFactory, ConnectionMeta, DisplayName};
    use crate::infrastructure::{InMemoryBroker, InMemoryRoomStore};
    use tokio::sync::mpsc;
    use utakata_shared::time::{get_utc_timestamp, timestamp_to_rfc3339};

    const TEST_POLL: Duration = Duration::from_millis(50);

    fn test_relay() -> (Arc<ConnectionRegistry>, InMemoryRoomStore, InMemoryBroker, RoomRelay) {
        let registry = Arc::new(ConnectionRegistry::new());
        let store = InMemoryRoomStore::new();
        let broker = InMemoryBroker::new();
        let relay = RoomRelay::with_poll_interval(
            Arc::clone(&registry),
            Arc::new(store.clone()),
            Arc::new(broker.clone()),
            TEST_POLL,
        );
        (registry, store, broker, relay)
    }

    fn test_envelope_json(room_id: &RoomId, text: &str) -> String {
        let now = get_utc_timestamp();
        let meta = ConnectionMeta::new(
            ConnectionIdFactory::generate(),
            DisplayName::new("alice".to_string()).unwrap(),
            now,
        );
        Envelope::chat(room_id, &meta, text.to_string(), timestamp_to_rfc3339(now)).to_json()
    }

    #[tokio::test]
    async fn test_relay_fans_out_to_local_connections() {
        // テスト項目: publish されたペイロードがローカル接続に届く
        // given (前提条件):
        let (registry, _store, broker, relay) = test_relay();
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry
            .register(&room_id, &ConnectionIdFactory::generate(), tx)
            .await;
        relay.ensure_running(&room_id).await.unwrap();

        // when (操作):
        let payload = test_envelope_json(&room_id, "hello");
        broker.publish(room_id.as_str(), &payload).await.unwrap();

        // then (期待する結果):
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(payload));

        relay.stop(room_id.as_str()).await;
    }

    #[tokio::test]
    async fn test_ensure_running_is_idempotent() {
        // テスト項目: ensure_running を繰り返してもタスクは1つのまま
        // given (前提条件):
        let (registry, _store, _broker, relay) = test_relay();
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry
            .register(&room_id, &ConnectionIdFactory::generate(), tx)
            .await;

        // when (操作):
        relay.ensure_running(&room_id).await.unwrap();
        relay.ensure_running(&room_id).await.unwrap();
        relay.ensure_running(&room_id).await.unwrap();

        // then (期待する結果):
        assert_eq!(relay.live_count().await, 1);

        relay.stop(room_id.as_str()).await;
    }

    #[tokio::test]
    async fn test_concurrent_joins_start_a_single_relay_task() {
        // テスト項目: 空のルームへの同時入室でも Relay Task は1つしか生まれない
        // given (前提条件):
        let (registry, _store, broker, relay) = test_relay();
        let relay = Arc::new(relay);
        let room_id = RoomId::new("room-1".to_string()).unwrap();

        async fn join_room(
            relay: Arc<RoomRelay>,
            registry: Arc<ConnectionRegistry>,
            room_id: RoomId,
        ) -> mpsc::UnboundedReceiver<String> {
            let (tx, rx) = mpsc::unbounded_channel();
            registry
                .register(&room_id, &ConnectionIdFactory::generate(), tx)
                .await;
            relay.ensure_running(&room_id).await.unwrap();
            rx
        }

        // when (操作): 2つの入室を並行に走らせる
        let (first, second) = tokio::join!(
            tokio::spawn(join_room(
                Arc::clone(&relay),
                Arc::clone(&registry),
                room_id.clone(),
            )),
            tokio::spawn(join_room(
                Arc::clone(&relay),
                Arc::clone(&registry),
                room_id.clone(),
            )),
        );
        let (mut rx1, mut rx2) = (first.unwrap(), second.unwrap());

        // then (期待する結果): タスクは1つで、両方の接続に配信される
        assert_eq!(relay.live_count().await, 1);
        let payload = test_envelope_json(&room_id, "hello");
        broker.publish(room_id.as_str(), &payload).await.unwrap();
        for rx in [&mut rx1, &mut rx2] {
            let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap();
            assert_eq!(received, Some(payload.clone()));
        }

        relay.stop(room_id.as_str()).await;
    }

    #[tokio::test]
    async fn test_stop_if_idle_spares_relay_for_newly_joined_connection() {
        // テスト項目: teardown のレジストリ確認後に入室した接続がいれば
        //             stop_if_idle はタスクを止めず、配信が継続する
        // given (前提条件): alice が入室して Relay Task が動いている
        let (registry, _store, broker, relay) = test_relay();
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let alice = ConnectionIdFactory::generate();
        registry.register(&room_id, &alice, tx_a).await;
        relay.ensure_running(&room_id).await.unwrap();

        // when (操作): alice の登録解除と stop の間に bob が入室する
        // （bob の ensure_running は生きているタスクを見て no-op になる）
        registry.deregister(room_id.as_str(), alice.as_str()).await;
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        registry
            .register(&room_id, &ConnectionIdFactory::generate(), tx_b)
            .await;
        relay.ensure_running(&room_id).await.unwrap();
        relay.stop_if_idle(room_id.as_str()).await;

        // then (期待する結果): タスクは生きていて bob に届く
        assert!(relay.is_running(room_id.as_str()).await);
        let payload = test_envelope_json(&room_id, "hello");
        broker.publish(room_id.as_str(), &payload).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(1), rx_b.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(payload));

        relay.stop(room_id.as_str()).await;
    }

    #[tokio::test]
    async fn test_stop_if_idle_stops_relay_without_local_connections() {
        // テスト項目: ローカル接続が残っていなければ stop_if_idle がタスクを止める
        // given (前提条件):
        let (registry, _store, _broker, relay) = test_relay();
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection_id = ConnectionIdFactory::generate();
        registry.register(&room_id, &connection_id, tx).await;
        relay.ensure_running(&room_id).await.unwrap();

        // when (操作):
        registry
            .deregister(room_id.as_str(), connection_id.as_str())
            .await;
        relay.stop_if_idle(room_id.as_str()).await;

        // then (期待する結果):
        assert!(!relay.is_running(room_id.as_str()).await);
        assert_eq!(relay.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_relay_exits_when_room_has_no_local_connections() {
        // テスト項目: ローカル接続が無くなると Relay Task が自律的に終了する
        // given (前提条件):
        let (registry, _store, _broker, relay) = test_relay();
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let connection_id = ConnectionIdFactory::generate();
        registry.register(&room_id, &connection_id, tx).await;
        relay.ensure_running(&room_id).await.unwrap();

        // when (操作): 唯一の接続を外し、タイムアウト境界を跨ぐまで待つ
        registry
            .deregister(room_id.as_str(), connection_id.as_str())
            .await;
        tokio::time::sleep(TEST_POLL * 4).await;

        // then (期待する結果):
        assert!(!relay.is_running(room_id.as_str()).await);
    }

    #[tokio::test]
    async fn test_finished_task_is_replaced() {
        // テスト項目: 終了済みタスクの残骸があっても ensure_running が新タスクで置き換える
        // given (前提条件):
        let (registry, _store, broker, relay) = test_relay();
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let first_connection = ConnectionIdFactory::generate();
        registry.register(&room_id, &first_connection, tx1).await;
        relay.ensure_running(&room_id).await.unwrap();

        // 全接続が消えてタスクが自律終了するのを待つ
        registry
            .deregister(room_id.as_str(), first_connection.as_str())
            .await;
        tokio::time::sleep(TEST_POLL * 4).await;
        assert!(!relay.is_running(room_id.as_str()).await);

        // when (操作): 新しい接続で再び ensure_running
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry
            .register(&room_id, &ConnectionIdFactory::generate(), tx2)
            .await;
        relay.ensure_running(&room_id).await.unwrap();

        // then (期待する結果): 新タスクが配信する
        let payload = test_envelope_json(&room_id, "again");
        broker.publish(room_id.as_str(), &payload).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(1), rx2.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(payload));

        relay.stop(room_id.as_str()).await;
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        // テスト項目: 不正なペイロードはスキップされ、後続の配信は続く
        // given (前提条件):
        let (registry, _store, broker, relay) = test_relay();
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry
            .register(&room_id, &ConnectionIdFactory::generate(), tx)
            .await;
        relay.ensure_running(&room_id).await.unwrap();

        // when (操作): 不正なペイロードのあとに正しい Envelope を流す
        broker
            .publish(room_id.as_str(), "not an envelope")
            .await
            .unwrap();
        let payload = test_envelope_json(&room_id, "valid");
        broker.publish(room_id.as_str(), &payload).await.unwrap();

        // then (期待する結果): 正しい Envelope だけが届く
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(payload));

        relay.stop(room_id.as_str()).await;
    }

    #[tokio::test]
    async fn test_broken_connection_is_cleaned_up() {
        // テスト項目: 送信に失敗した接続がレジストリとストアから除去される
        // given (前提条件):
        let (registry, store, broker, relay) = test_relay();
        let room_id = RoomId::new("room-1".to_string()).unwrap();
        let broken_id = ConnectionIdFactory::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx); // 受信側が既に死んでいる接続
        registry.register(&room_id, &broken_id, tx).await;
        store
            .add_member(
                room_id.as_str(),
                ConnectionMeta::new(
                    broken_id.clone(),
                    DisplayName::new("ghost".to_string()).unwrap(),
                    get_utc_timestamp(),
                ),
                Duration::from_secs(600),
            )
            .await
            .unwrap();

        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        registry
            .register(&room_id, &ConnectionIdFactory::generate(), live_tx)
            .await;
        relay.ensure_running(&room_id).await.unwrap();

        // when (操作):
        let payload = test_envelope_json(&room_id, "hello");
        broker.publish(room_id.as_str(), &payload).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), live_rx.recv())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // then (期待する結果):
        assert_eq!(registry.count(room_id.as_str()).await, 1);
        assert_eq!(store.count_members(room_id.as_str()).await.unwrap(), 0);

        relay.stop(room_id.as_str()).await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        // テスト項目: stop は走っていないルームに対しても安全
        // given (前提条件):
        let (_registry, _store, _broker, relay) = test_relay();

        // when (操作):
        relay.stop("room-1").await;
        relay.stop("room-1").await;

        // then (期待する結果):
        assert_eq!(relay.live_count().await, 0);
    }
}
