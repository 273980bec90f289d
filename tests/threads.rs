use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use observe_props::arc::{Object, Subscription};
use observe_props::{Computed, ListenerError, Schema, Var};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn shared_objects_are_send_and_sync() {
	assert_send_sync::<Object>();
	assert_send_sync::<Subscription>();
	assert_send_sync::<Schema>();
}

type Log = Arc<Mutex<Vec<String>>>;

fn voter() -> (Object, Var<u32>, Var<bool>, Computed<bool>) {
	let mut builder = Schema::builder();
	let age = builder.base("Age", 15u32).unwrap();
	let citizen = builder.base("Citizen", false).unwrap();
	let can_vote = builder
		.computed("CanVote", &["Citizen", "Age"], move |cx| {
			*cx.get(&citizen) && *cx.get(&age) >= 16
		})
		.unwrap();

	(Object::new(builder.build().unwrap()), age, citizen, can_vote)
}

fn record(object: &Object) -> (Log, Subscription) {
	let log = Log::default();
	let sub = object.subscribe({
		let log = log.clone();
		move |change| log.lock().unwrap().push(change.name().to_string())
	});
	(log, sub)
}

fn take(log: &Log) -> Vec<String> {
	std::mem::take(&mut *log.lock().unwrap())
}

#[test]
fn replace_and_update_from_another_thread() {
	let (person, age, citizen, can_vote) = voter();
	person.set(&citizen, true);
	let (log, _sub) = record(&person);

	let worker = person.clone();
	let old = thread::spawn(move || worker.replace(&age, 20)).join().unwrap();
	assert_eq!(old, 15);
	assert_eq!(take(&log), ["Age", "CanVote"]);

	let worker = person.clone();
	let changed = thread::spawn(move || worker.update(&age, |years| *years += 1))
		.join()
		.unwrap();
	assert!(changed);
	assert_eq!(take(&log), ["Age"]);

	assert!(!person.update(&age, |_| ()));
	assert_eq!(person.replace(&age, 21), 21);
	assert!(take(&log).is_empty());

	assert_eq!(person.set_named("Age", 10u32), Ok(true));
	assert_eq!(take(&log), ["Age", "CanVote"]);
	assert!(!person.get(&can_vote));
}

#[test]
fn shared_unsubscribe_is_idempotent() {
	let (person, age, _, _) = voter();
	let (log, sub) = record(&person);
	let (_other, _other_sub) = record(&person);
	assert_eq!(person.listener_count(), 2);

	let sub = Arc::new(sub);
	thread::scope(|scope| {
		for _ in 0..4 {
			let sub = sub.clone();
			scope.spawn(move || sub.unsubscribe());
		}
	});
	assert_eq!(person.listener_count(), 1);

	drop(sub);
	assert_eq!(person.listener_count(), 1);

	person.set(&age, 30);
	assert!(take(&log).is_empty());
}

#[test]
fn panicking_hook_drops_the_rest_of_its_write() {
	let mut builder = Schema::builder();
	let a = builder.base("A", 0i32).unwrap();
	builder.computed("B", &["A"], move |cx| *cx.get(&a) * 2).unwrap();
	let other = builder.base("Other", 0i32).unwrap();
	let object = Object::new(builder.build().unwrap());

	object.on_listener_error(|err: &ListenerError| panic!("hook gave up on {}", err.property()));
	let _faulty = object.subscribe(move |change| {
		if change.is(&a) {
			panic!("listener bug");
		}
	});
	let (log, _sub) = record(&object);

	let result = panic::catch_unwind(AssertUnwindSafe(|| object.set(&a, 5)));
	assert!(result.is_err());
	assert!(take(&log).is_empty());

	object.set(&other, 1);
	assert_eq!(take(&log), ["Other"]);
}

#[test]
fn voting_scenarios_across_threads() {
	let mut builder = Schema::builder();
	let age = builder.base("Age", 15u32).unwrap();
	let citizen = builder.base("Citizen", false).unwrap();
	let can_vote = builder
		.computed("CanVote", &["Citizen", "Age"], move |cx| {
			*cx.get(&citizen) && *cx.get(&age) >= 16
		})
		.unwrap();
	let person = Object::new(builder.build().unwrap());

	let log = Arc::new(Mutex::new(Vec::new()));
	let _sub = person.subscribe({
		let log = log.clone();
		move |change| log.lock().unwrap().push(change.name().to_string())
	});

	thread::scope(|scope| {
		scope.spawn(|| person.set(&age, 16)).join().unwrap();
	});
	assert_eq!(*log.lock().unwrap(), ["Age"]);

	let worker = person.clone();
	thread::spawn(move || worker.set(&citizen, true)).join().unwrap();
	assert_eq!(*log.lock().unwrap(), ["Age", "Citizen", "CanVote"]);
	assert!(person.get(&can_vote));
}

#[test]
fn every_effective_write_is_announced_once() {
	let mut builder = Schema::builder();
	let counter = builder.base("Counter", 0u64).unwrap();
	let even = builder
		.computed("Even", &["Counter"], move |cx| *cx.get(&counter) % 2 == 0)
		.unwrap();
	let object = Object::new(builder.build().unwrap());

	let announced = Arc::new(AtomicUsize::new(0));
	let _sub = object.subscribe({
		let announced = announced.clone();
		move |change| {
			if change.is(&counter) {
				announced.fetch_add(1, Ordering::SeqCst);
			}
		}
	});

	let changed = AtomicUsize::new(0);
	thread::scope(|scope| {
		for worker in 0..4u64 {
			let object = &object;
			let changed = &changed;
			scope.spawn(move || {
				for step in 0..250 {
					if object.set(&counter, worker * 1000 + step % 3) {
						changed.fetch_add(1, Ordering::SeqCst);
					}
				}
			});
		}
	});

	assert_eq!(announced.load(Ordering::SeqCst), changed.load(Ordering::SeqCst));
	let value = object.get(&counter);
	assert_eq!(object.get(&even), value % 2 == 0);
}

#[test]
fn listener_can_write_back_on_the_same_thread() {
	let mut builder = Schema::builder();
	let celsius = builder.base("Celsius", 0i32).unwrap();
	let clamped = builder.base("Clamped", false).unwrap();
	let object = Object::new(builder.build().unwrap());

	let log = Arc::new(Mutex::new(Vec::new()));
	let _clamp = object.subscribe({
		let object = object.downgrade();
		move |change| {
			if !change.is(&celsius) {
				return;
			}

			if let Some(object) = object.upgrade() {
				if object.get(&celsius) > 100 {
					object.set(&celsius, 100);
					object.set(&clamped, true);
				}
			}
		}
	});
	let _sub = object.subscribe({
		let log = log.clone();
		move |change| log.lock().unwrap().push(change.name().to_string())
	});

	object.set(&celsius, 150);

	assert_eq!(object.get(&celsius), 100);
	assert_eq!(*log.lock().unwrap(), ["Celsius", "Celsius", "Clamped"]);
}

#[test]
fn listener_errors_reach_the_hook() {
	let mut builder = Schema::builder();
	let flag = builder.base("Flag", false).unwrap();
	let object = Object::new(builder.build().unwrap());

	let errors = Arc::new(Mutex::new(Vec::new()));
	object.on_listener_error({
		let errors = errors.clone();
		move |err: &ListenerError| errors.lock().unwrap().push(err.property().to_string())
	});
	let _sub = object.subscribe(|_| panic!("nope"));
	let seen = Arc::new(AtomicUsize::new(0));
	let _counter = object.subscribe({
		let seen = seen.clone();
		move |_| {
			seen.fetch_add(1, Ordering::SeqCst);
		}
	});

	object.set(&flag, true);

	assert_eq!(*errors.lock().unwrap(), ["Flag"]);
	assert_eq!(seen.load(Ordering::SeqCst), 1);
}
