//! End-to-end tests: drivers push traffic through a registered pass-through
//! design, monitors reassemble it, and a scoreboard checks the result.

use std::sync::Arc;

use tempo_bus::data::{packets, random_data, random_packet_sizes};
use tempo_bus::timing::random_50_percent;
use tempo_bus::{
    expected_queue, BitDriver, Monitor, Packet, PacketCapture, Scoreboard, StreamPacketDriver,
};
use tempo_common::LogicVec;
use tempo_config::{FailurePolicy, StreamConfig};
use tempo_sim::{Clock, SignalAccess, SignalExt, SignalHost, SimHost, SimTime, TaskHandle};

// ---------------------------------------------------------------------------
// Helper: a two-port bench with a one-stage pipeline between the ports
// ---------------------------------------------------------------------------

const FORWARDED: &[&str] = &["data", "startofpacket", "endofpacket", "empty", "channel"];

struct Bench {
    host: SimHost,
    clock: Clock,
    _clock_task: TaskHandle<()>,
    _design: TaskHandle<()>,
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `sink` is driven by the test, `source` is observed. The design registers
/// every accepted `sink` transfer onto `source` one cycle later. `source`
/// has no ready signal.
fn bench(data_width: u32) -> Bench {
    init_logging();
    let host = SimHost::new();
    for port in ["sink", "source"] {
        for (name, width) in [
            ("valid", 1),
            ("data", data_width),
            ("startofpacket", 1),
            ("endofpacket", 1),
            ("empty", 2),
            ("channel", 4),
        ] {
            host.add_signal_with(&format!("{port}_{name}"), LogicVec::new(width))
                .unwrap();
        }
    }
    host.add_signal_with("sink_ready", LogicVec::from_bool(true))
        .unwrap();
    let (clock, clock_task) = host.start_clock("clk", SimTime::from_steps(10)).unwrap();

    let design = {
        let (host, clock) = (host.clone(), clock.clone());
        TaskHandle::spawn("pass-through", async move {
            let signal = |name: &str| host.lookup(name).unwrap();
            while clock.rising_edge().await.is_ok() {
                let accepted = signal("sink_valid").is_high() && signal("sink_ready").is_high();
                signal("source_valid").set_bool(accepted).unwrap();
                for name in FORWARDED {
                    let value = signal(&format!("sink_{name}")).value();
                    signal(&format!("source_{name}")).set_value(value).unwrap();
                }
            }
        })
    };
    Bench {
        host,
        clock,
        _clock_task: clock_task,
        _design: design,
    }
}

fn source_monitor(b: &Bench, report_channel: bool) -> Monitor<Packet> {
    let capture = PacketCapture::new(
        &b.host,
        "source",
        &b.clock,
        &StreamConfig::default(),
        report_channel,
    )
    .unwrap();
    Monitor::spawn("source", capture)
}

fn sink_driver(b: &Bench) -> StreamPacketDriver {
    StreamPacketDriver::new(&b.host, "sink", &b.clock, &StreamConfig::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Traffic with backpressure and idle insertion
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn random_traffic_passes_the_scoreboard() {
    let b = bench(32);
    let monitor = source_monitor(&b, false);
    let driver = sink_driver(&b);
    driver
        .set_idle_generator(Some(Box::new(random_50_percent(3.0, None, 5))))
        .await;
    let mut ready = BitDriver::new(b.host.lookup("sink_ready").unwrap(), &b.clock);
    ready.start(Box::new(random_50_percent(2.0, None, 6)));

    let sizes = random_packet_sizes(1, 20, 12, 1);
    let stimulus: Vec<Packet> = packets(&sizes, &mut random_data(2))
        .into_iter()
        .map(Packet::new)
        .collect();
    let scoreboard = Scoreboard::new(FailurePolicy::CollectAll, 0);
    scoreboard.add_interface(&monitor, expected_queue(stimulus.clone()));

    for packet in &stimulus {
        driver.send_packet(packet, true).await.unwrap();
    }
    b.clock.cycles(3).await.unwrap();
    ready.stop();

    let summary = scoreboard.result().unwrap();
    assert_eq!(summary.matched, stimulus.len());
    assert!(monitor.failure().is_none());
}

#[tokio::test(start_paused = true)]
async fn reconstructed_length_accounts_for_padding() {
    let b = bench(32);
    let monitor = source_monitor(&b, false);
    let driver = sink_driver(&b);
    let symbols = driver.config().symbols_per_word as usize;

    for len in 1..=13usize {
        let packet = Packet::new((0..len as u8).collect::<Vec<_>>());
        driver.send_packet(&packet, true).await.unwrap();
        let received = monitor.wait_for_next(Some(SimTime::from_steps(50))).await;
        let received = received.unwrap();

        let words = len.div_ceil(symbols);
        let padding = words * symbols - len;
        assert_eq!(received.data.len(), (words - 1) * symbols + (symbols - padding));
        assert_eq!(received, packet);
    }
}

#[tokio::test(start_paused = true)]
async fn channel_ids_survive_the_round_trip() {
    let b = bench(16);
    let monitor = source_monitor(&b, true);
    let driver = sink_driver(&b);
    let sent = vec![
        Packet::with_channel(vec![1, 2, 3], 4),
        Packet::with_channel(vec![5], 15),
        Packet::with_channel(vec![6, 7, 8, 9], 0),
    ];
    for packet in &sent {
        driver.send_packet(packet, true).await.unwrap();
    }
    b.clock.cycles(3).await.unwrap();
    let received: Vec<Packet> = std::iter::from_fn(|| monitor.pop_front()).collect();
    assert_eq!(received, sent);
}

// ---------------------------------------------------------------------------
// Arbitration and verdicts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn concurrent_senders_never_interleave_packets() {
    let b = bench(8);
    let monitor = source_monitor(&b, false);
    let driver = Arc::new(sink_driver(&b));

    let senders: Vec<_> = [0x10u8, 0x80]
        .into_iter()
        .map(|base| {
            let driver = driver.clone();
            tokio::spawn(async move {
                for n in 0..3u8 {
                    let packet = Packet::new(vec![base + n; 3]);
                    driver.send_packet(&packet, true).await.unwrap();
                }
            })
        })
        .collect();
    for sender in senders {
        sender.await.unwrap();
    }
    b.clock.cycles(3).await.unwrap();

    let mut received: Vec<Vec<u8>> = std::iter::from_fn(|| monitor.pop_front())
        .map(|p| p.data)
        .collect();
    received.sort();
    let mut expected: Vec<Vec<u8>> = [0x10u8, 0x11, 0x12, 0x80, 0x81, 0x82]
        .into_iter()
        .map(|v| vec![v; 3])
        .collect();
    expected.sort();
    assert_eq!(received, expected);
}

#[tokio::test(start_paused = true)]
async fn out_of_order_arrival_fails_immediately() {
    let b = bench(8);
    let monitor = source_monitor(&b, false);
    let driver = sink_driver(&b);
    let t1 = Packet::new(vec![1, 1]);
    let t2 = Packet::new(vec![2, 2]);
    let scoreboard = Scoreboard::new(FailurePolicy::FailImmediately, 0);
    scoreboard.add_interface(&monitor, expected_queue([t1.clone(), t2.clone()]));

    driver.send_packet(&t2, true).await.unwrap();
    driver.send_packet(&t1, true).await.unwrap();
    scoreboard.failed().await;
    b.clock.cycles(3).await.unwrap();

    let failure = scoreboard.result().unwrap_err();
    assert_eq!(failure.mismatches.len(), 1);
    assert!(failure.mismatches[0].starts_with("source: expected Packet { data: [1, 1]"));
}

#[tokio::test(start_paused = true)]
async fn wait_for_next_honours_its_timeout() {
    let b = bench(8);
    let monitor = source_monitor(&b, false);
    assert_eq!(monitor.wait_for_next(Some(SimTime::from_steps(40))).await, None);
    assert_eq!(monitor.wait_for_next(Some(SimTime::ZERO)).await, None);

    let driver = sink_driver(&b);
    let send = async {
        driver.send_packet(&Packet::new(vec![42]), true).await.unwrap();
    };
    let (_, received) = tokio::join!(send, monitor.wait_for_next(Some(SimTime::from_steps(100))));
    assert_eq!(received, Some(Packet::new(vec![42])));
}
