// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! ftl-stress - Stress testing tool for FTL
//!
//! Drives publishers, event queues and direct publishers from several
//! threads and reports throughput and data loss.

use clap::{Parser, Subcommand};
use ftl::advisory;
use ftl::config::{queue as qprops, ADVISORY_ENDPOINT};
use ftl::{message_callback, DiscardPolicy, Message, Properties, Realm, Timeout};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

type AnyResult<T> = Result<T, Box<dyn std::error::Error>>;

/// FTL stress testing tool
#[derive(Parser, Debug)]
#[command(name = "ftl-stress")]
#[command(version = "0.1.0")]
#[command(about = "Stress test FTL event queues and direct pub/sub")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// In-process realm server URL
    #[arg(short, long, default_value = "inproc://ftl-stress", global = true)]
    url: String,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Publisher threads feeding one dispatching queue
    Throughput {
        /// Number of publisher threads
        #[arg(short, long, default_value = "4")]
        publishers: usize,

        /// Messages per send call
        #[arg(short, long, default_value = "16")]
        batch: usize,

        /// Duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },

    /// Fast publisher against a bounded queue and a slow consumer
    Discard {
        /// OLD or NEW
        #[arg(short, long, default_value = "OLD")]
        policy: String,

        /// Queue limit in events
        #[arg(short, long, default_value = "1000")]
        max_events: i32,

        /// Events evicted per overflow (OLD only)
        #[arg(short, long, default_value = "100")]
        amount: i32,

        /// Messages to publish
        #[arg(short = 'n', long, default_value = "100000")]
        count: usize,

        /// Consumer delay per batch in microseconds
        #[arg(long, default_value = "200")]
        delay_us: u64,
    },

    /// Direct publishers competing for reservations
    Direct {
        /// Number of publisher threads
        #[arg(short, long, default_value = "2")]
        publishers: usize,

        /// Payload size in bytes
        #[arg(short, long, default_value = "256")]
        size: usize,

        /// Buffers per publisher thread
        #[arg(short = 'n', long, default_value = "100000")]
        count: usize,
    },
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> AnyResult<()> {
    ftl::open(ftl::COMPATIBILITY_VERSION)?;
    let result = match &args.mode {
        Mode::Throughput {
            publishers,
            batch,
            duration,
        } => run_throughput_test(&args.url, *publishers, *batch, *duration),
        Mode::Discard {
            policy,
            max_events,
            amount,
            count,
            delay_us,
        } => run_discard_test(&args.url, policy, *max_events, *amount, *count, *delay_us),
        Mode::Direct {
            publishers,
            size,
            count,
        } => run_direct_test(&args.url, *publishers, *size, *count),
    };
    ftl::close()?;
    result
}

fn rate(count: u64, elapsed: Duration) -> f64 {
    count as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
}

fn run_throughput_test(url: &str, publishers: usize, batch: usize, duration_secs: u64) -> AnyResult<()> {
    println!(
        "=== FTL Throughput Test: {} publisher(s), batch {}, {}s ===\n",
        publishers, batch, duration_secs
    );

    let realm = Realm::connect(url, "ftl-stress-throughput", None)?;
    let queue = realm.create_queue(None)?;
    let sub = realm.create_subscriber("stress", None, None)?;
    let received = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&received);
    queue.add_subscriber(
        &sub,
        message_callback(move |_, _, msgs, _| {
            counter.fetch_add(msgs.len() as u64, Ordering::Relaxed);
        }),
        None,
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;
    println!("  Press Ctrl+C to stop early\n");

    let sent = AtomicU64::new(0);
    let start = Instant::now();
    let end_time = start + Duration::from_secs(duration_secs);

    thread::scope(|s| -> AnyResult<()> {
        for id in 0..publishers {
            let publisher = realm.create_publisher("stress", None)?;
            let running = &running;
            let sent = &sent;
            s.spawn(move || {
                let msgs: Vec<Message> = (0..batch)
                    .map(|i| {
                        let mut msg = Message::new();
                        let _ = msg.set_long("publisher", id as i64);
                        let _ = msg.set_long("seq", i as i64);
                        msg
                    })
                    .collect();
                while running.load(Ordering::Relaxed) && Instant::now() < end_time {
                    if let Err(e) = publisher.send_messages(&msgs) {
                        log::error!("[stress] publisher {} failed: {}", id, e);
                        break;
                    }
                    sent.fetch_add(msgs.len() as u64, Ordering::Relaxed);
                }
            });
        }

        let mut last_report = Instant::now();
        let mut last_count = 0u64;
        while running.load(Ordering::Relaxed) && Instant::now() < end_time {
            queue.dispatch(Duration::from_millis(100))?;
            if last_report.elapsed() >= Duration::from_secs(1) {
                let current = received.load(Ordering::Relaxed);
                println!(
                    "  [{:>4}s] Received: {} total, {:.0} msg/s",
                    start.elapsed().as_secs(),
                    current,
                    rate(current - last_count, last_report.elapsed())
                );
                last_report = Instant::now();
                last_count = current;
            }
        }
        Ok(())
    })?;

    while queue.count()? > 0 {
        queue.dispatch(Timeout::NoWait)?;
    }
    let elapsed = start.elapsed();
    let total_sent = sent.load(Ordering::Relaxed);
    let total_received = received.load(Ordering::Relaxed);

    println!("\n=== Results ===");
    println!("  Duration: {:?}", elapsed);
    println!("  Messages sent: {}", total_sent);
    println!("  Messages received: {}", total_received);
    println!("  Average rate: {:.1} msg/s", rate(total_received, elapsed));

    queue.destroy()?;
    realm.close()?;
    Ok(())
}

fn run_discard_test(
    url: &str,
    policy: &str,
    max_events: i32,
    amount: i32,
    count: usize,
    delay_us: u64,
) -> AnyResult<()> {
    let policy = match policy.to_ascii_uppercase().as_str() {
        "OLD" => DiscardPolicy::Old,
        "NEW" => DiscardPolicy::New,
        other => return Err(format!("unknown discard policy '{}'", other).into()),
    };
    println!(
        "=== FTL Discard Test: {:?}, max {} events, {} messages ===\n",
        policy, max_events, count
    );

    let realm = Realm::connect(url, "ftl-stress-discard", None)?;
    let mut p = Properties::new();
    p.set_int(qprops::DISCARD_POLICY, policy as i32)
        .set_int(qprops::DISCARD_MAX_EVENTS, max_events)
        .set_string(qprops::NAME, "stress-bounded".into());
    if policy == DiscardPolicy::Old {
        p.set_int(qprops::DISCARD_AMOUNT, amount);
    }
    let data_queue = realm.create_queue(Some(&p))?;
    let advisory_queue = realm.create_queue(None)?;

    let received = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&received);
    let sub = realm.create_subscriber("stress", None, None)?;
    data_queue.add_subscriber(
        &sub,
        message_callback(move |_, _, msgs, _| {
            counter.fetch_add(msgs.len() as u64, Ordering::Relaxed);
        }),
        None,
    )?;

    let advisories = Arc::new(AtomicU64::new(0));
    let reported = Arc::new(AtomicU64::new(0));
    let (adv_count, loss_count) = (Arc::clone(&advisories), Arc::clone(&reported));
    let matcher = advisory::matcher_for(advisory::NAME_DATALOSS)?;
    let adv_sub = realm.create_subscriber(ADVISORY_ENDPOINT, Some(&matcher), None)?;
    advisory_queue.add_subscriber(
        &adv_sub,
        message_callback(move |_, _, msgs, _| {
            for m in msgs.iter() {
                adv_count.fetch_add(1, Ordering::Relaxed);
                if let Ok(n) = m.get_long(advisory::FIELD_AGGREGATION_COUNT) {
                    loss_count.fetch_add(n as u64, Ordering::Relaxed);
                }
            }
        }),
        None,
    )?;

    let done = AtomicBool::new(false);
    let delay = Duration::from_micros(delay_us);
    let start = Instant::now();

    thread::scope(|s| -> AnyResult<()> {
        let publisher = realm.create_publisher("stress", None)?;
        let done = &done;
        s.spawn(move || {
            let mut msg = Message::new();
            for i in 0..count {
                if msg.set_long("seq", i as i64).is_err() || publisher.send(&msg).is_err() {
                    log::error!("[stress] publisher stopped at {}", i);
                    break;
                }
            }
            done.store(true, Ordering::SeqCst);
        });

        while !done.load(Ordering::SeqCst) || data_queue.count()? > 0 {
            data_queue.dispatch(Duration::from_millis(10))?;
            spin_sleep::sleep(delay);
        }
        Ok(())
    })?;

    while advisory_queue.count()? > 0 {
        advisory_queue.dispatch(Timeout::NoWait)?;
    }

    let total_received = received.load(Ordering::Relaxed);
    println!("=== Results ===");
    println!("  Duration: {:?}", start.elapsed());
    println!("  Messages sent: {}", count);
    println!("  Messages received: {}", total_received);
    println!("  Messages discarded: {}", count as u64 - total_received);
    println!("  DATALOSS advisories: {}", advisories.load(Ordering::Relaxed));
    println!("  Loss reported by advisories: {}", reported.load(Ordering::Relaxed));

    data_queue.destroy()?;
    advisory_queue.destroy()?;
    realm.close()?;
    Ok(())
}

fn run_direct_test(url: &str, publishers: usize, size: usize, count: usize) -> AnyResult<()> {
    println!(
        "=== FTL Direct Test: {} publisher thread(s), {} x {}B ===\n",
        publishers, count, size
    );

    let realm = Realm::connect(url, "ftl-stress-direct", None)?;
    let sub = realm.create_direct_subscriber("stress-raw", None)?;
    let publisher = realm.create_direct_publisher("stress-raw", None)?;

    let received = AtomicU64::new(0);
    let bytes = AtomicU64::new(0);
    let finished = AtomicU64::new(0);
    let start = Instant::now();

    thread::scope(|s| {
        for id in 0..publishers {
            let publisher = &publisher;
            let finished = &finished;
            s.spawn(move || {
                for i in 0..count {
                    let sent = publisher.reserve(1, size).and_then(|mut res| {
                        res.data_mut().fill((i % 251) as u8);
                        res.sizes_mut()[0] = size;
                        res.send_reserved()
                    });
                    if let Err(e) = sent {
                        log::error!("[stress] direct publisher {} failed: {}", id, e);
                        break;
                    }
                }
                finished.fetch_add(1, Ordering::SeqCst);
            });
        }

        while finished.load(Ordering::SeqCst) < publishers as u64 || sub.has_data() {
            let handled = sub.dispatch(Duration::from_millis(10), |buf| {
                received.fetch_add(buf.count() as u64, Ordering::Relaxed);
                bytes.fetch_add(buf.total_size() as u64, Ordering::Relaxed);
            });
            if let Err(e) = handled {
                log::error!("[stress] direct dispatch failed: {}", e);
                break;
            }
        }
    });

    let elapsed = start.elapsed();
    let total = received.load(Ordering::Relaxed);
    println!("=== Results ===");
    println!("  Duration: {:?}", elapsed);
    println!("  Buffers received: {}", total);
    println!(
        "  Average rate: {:.1} buffers/s, {:.1} MB/s",
        rate(total, elapsed),
        bytes.load(Ordering::Relaxed) as f64 / 1_048_576.0 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    sub.close()?;
    publisher.close()?;
    realm.close()?;
    Ok(())
}
