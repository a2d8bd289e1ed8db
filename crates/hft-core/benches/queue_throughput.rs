use criterion::{criterion_group, criterion_main, Criterion};
use hft_core::queue::Queue;
use std::hint::black_box;

fn bench_push_pop(c: &mut Criterion) {
    let queue = Queue::<u64>::new(4096);

    c.bench_function("queue_push_pop_roundtrip", |b| {
        b.iter(|| {
            queue.try_push(black_box(42)).expect("queue should have room");
            black_box(queue.try_pop());
        });
    });
}

fn bench_mpmc_contention(c: &mut Criterion) {
    use std::sync::Arc;
    use std::thread;

    let queue = Arc::new(Queue::<u64>::new(4096));

    c.bench_function("queue_4p2c_contended", |b| {
        b.iter(|| {
            let producers: Vec<_> = (0..4)
                .map(|_| {
                    let q = Arc::clone(&queue);
                    thread::spawn(move || {
                        for i in 0..256u64 {
                            while q.try_push(i).is_err() {
                                std::hint::spin_loop();
                            }
                        }
                    })
                })
                .collect();
            let consumers: Vec<_> = (0..2)
                .map(|_| {
                    let q = Arc::clone(&queue);
                    thread::spawn(move || {
                        let mut popped = 0;
                        while popped < 512 {
                            if q.try_pop().is_some() {
                                popped += 1;
                            }
                        }
                    })
                })
                .collect();
            for p in producers {
                p.join().unwrap();
            }
            for c in consumers {
                c.join().unwrap();
            }
        });
    });
}

criterion_group!(benches, bench_push_pop, bench_mpmc_contention);
criterion_main!(benches);
