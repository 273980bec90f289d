use mockall::Sequence;
use observe_props::rc::Object;
use observe_props::Schema;

use crate::mock::{Recorder, SharedMock};

#[test]
fn transitive_chain_is_announced_in_order() {
	let mut builder = Schema::builder();
	let a = builder.base("A", 1).unwrap();
	let b = builder.computed("B", &["A"], move |cx| *cx.get(&a) > 1).unwrap();
	builder
		.computed("C", &["B"], move |cx| if *cx.get(&b) { "big" } else { "small" })
		.unwrap();
	let object = Object::new(builder.build().unwrap());

	let mock = SharedMock::new();
	let _sub = mock.listen(&object);

	let mut seq = Sequence::new();
	for name in ["A", "B", "C"] {
		mock.get()
			.expect_notified()
			.withf(move |property: &str| property == name)
			.times(1)
			.in_sequence(&mut seq)
			.return_const(());
	}

	object.set(&a, 2);
	mock.get().checkpoint();
}

#[test]
fn diamond_announces_each_changed_property_once() {
	let mut builder = Schema::builder();
	let a = builder.base("A", 0).unwrap();
	let b = builder.computed("B", &["A"], move |cx| *cx.get(&a) / 2).unwrap();
	let c = builder.computed("C", &["A"], move |cx| *cx.get(&a) % 2).unwrap();
	let d = builder
		.computed("D", &["B", "C"], move |cx| *cx.get(&b) + *cx.get(&c))
		.unwrap();
	let object = Object::new(builder.build().unwrap());
	let log = Recorder::default();
	let _sub = log.listen(&object);

	// B stays 0, C flips.
	object.set(&a, 1);
	assert_eq!(log.take(), ["A", "C", "D"]);

	// B flips, C stays 1.
	object.set(&a, 3);
	assert_eq!(log.take(), ["A", "B", "D"]);

	// Both flip, D stays 2.
	object.set(&a, 4);
	assert_eq!(log.take(), ["A", "B", "C"]);
	assert_eq!(object.get(&d), 2);
}

#[test]
fn computed_is_never_stale() {
	let mut builder = Schema::builder();
	let first = builder.base("First", String::from("Ada")).unwrap();
	let last = builder.base("Last", String::from("Lovelace")).unwrap();
	let full = builder
		.computed("Full", &["First", "Last"], move |cx| {
			format!("{} {}", *cx.get(&first), *cx.get(&last))
		})
		.unwrap();
	let initials = builder
		.computed("Initials", &["Full"], move |cx| {
			cx.get(&full)
				.split(' ')
				.filter_map(|part| part.chars().next())
				.collect::<String>()
		})
		.unwrap();
	let object = Object::new(builder.build().unwrap());

	assert_eq!(object.get(&initials), "AL");
	object.set(&last, String::from("King"));
	assert_eq!(object.get(&full), "Ada King");
	assert_eq!(object.get(&initials), "AK");
}

#[test]
fn cascade_reaches_several_levels_down() {
	let mut builder = Schema::builder();
	let celsius = builder.base("Celsius", 20.0_f64).unwrap();
	let fahrenheit = builder
		.computed("Fahrenheit", &["Celsius"], move |cx| *cx.get(&celsius) * 9.0 / 5.0 + 32.0)
		.unwrap();
	let hot = builder
		.computed("Hot", &["Fahrenheit"], move |cx| *cx.get(&fahrenheit) > 90.0)
		.unwrap();
	builder
		.computed("Warning", &["Hot"], move |cx| {
			cx.get(&hot).then(|| String::from("stay inside"))
		})
		.unwrap();
	let object = Object::new(builder.build().unwrap());
	let log = Recorder::default();
	let _sub = log.listen(&object);

	object.set(&celsius, 25.0);
	assert_eq!(log.take(), ["Celsius", "Fahrenheit"]);

	object.set(&celsius, 40.0);
	assert_eq!(log.take(), ["Celsius", "Fahrenheit", "Hot", "Warning"]);
}
