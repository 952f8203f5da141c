use domain_discriminator::{DiscriminatorConfig, DiscriminatorModel, Error};
use tch::{kind, nn::ModuleT, Device, Kind, Tensor};

fn model(nb_outputs: i64) -> DiscriminatorModel {
    DiscriminatorModel::new(Device::Cpu, DiscriminatorConfig::new(nb_outputs)).unwrap()
}

#[test]
fn output_shape_follows_batch_size() {
    let m = model(5);
    for n in [1, 2, 7] {
        for (h, w) in [(3, 4), (4, 3), (2, 6), (1, 12)] {
            let ys = m.predict(&Tensor::randn([n, 128, h, w], kind::FLOAT_CPU)).unwrap();
            assert_eq!(ys.size(), vec![n, 5], "input {n}x128x{h}x{w}");
        }
    }
}

#[test]
fn ten_outputs_for_a_single_3x4_map() {
    let m = model(10);
    let ys = m.forward(&Tensor::randn([1, 128, 3, 4], kind::FLOAT_CPU)).unwrap();
    assert_eq!(ys.size(), vec![1, 10]);
}

#[test]
fn inference_is_deterministic() {
    let m = model(4);
    let xs = Tensor::randn([3, 128, 3, 4], kind::FLOAT_CPU);
    let first = m.predict(&xs).unwrap();
    let second = m.predict(&xs).unwrap();
    assert!(first.equal(&second));
}

#[test]
fn sixteen_cell_map_fails_at_projection() {
    let m = model(10);
    let err = m.predict(&Tensor::randn([1, 128, 4, 4], kind::FLOAT_CPU)).unwrap_err();
    match err {
        Error::ShapeMismatch { layer, expected, actual, .. } => {
            assert_eq!(layer, "linear_1");
            assert_eq!(expected, 192);
            assert_eq!(actual, 256);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn wrong_channel_count_fails_at_first_convolution() {
    let m = model(2);
    let err = m.predict(&Tensor::randn([1, 64, 3, 4], kind::FLOAT_CPU)).unwrap_err();
    assert_eq!(err.to_string(), "cnn_1: expected 128 input channels, got 64");
}

#[test]
fn outputs_are_finite() {
    let mut m = model(6);
    let xs = Tensor::randn([16, 128, 3, 4], kind::FLOAT_CPU);
    for ys in [m.predict(&xs).unwrap(), m.forward_train(&xs).unwrap()] {
        let values = Vec::<f32>::try_from(&ys.to_kind(Kind::Float).flatten(0, -1)).unwrap();
        assert_eq!(values.len(), 16 * 6);
        assert!(values.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn zero_outputs_is_rejected() {
    let err = DiscriminatorModel::new(Device::Cpu, DiscriminatorConfig::new(0)).unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)), "{err}");
}

#[test]
fn save_and_load_reproduce_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("d_weights.pt");

    let mut trained = model(3);
    // Move the running statistics away from their initial values first.
    trained.forward_train(&(Tensor::randn([8, 128, 3, 4], kind::FLOAT_CPU) * 2.0)).unwrap();
    trained.save(&path).unwrap();

    let mut restored = model(3);
    let xs = Tensor::randn([2, 128, 3, 4], kind::FLOAT_CPU);
    assert!(!restored.predict(&xs).unwrap().equal(&trained.predict(&xs).unwrap()));

    restored.load(&path).unwrap();
    assert!(restored.predict(&xs).unwrap().equal(&trained.predict(&xs).unwrap()));
}

#[test]
#[should_panic(expected = "linear_1")]
fn module_t_panics_on_bad_input() {
    let m = model(2);
    let xs = Tensor::randn([1, 128, 4, 4], kind::FLOAT_CPU);
    let _ = ModuleT::forward_t(m.network(), &xs, false);
}

#[test]
fn shared_network_cannot_move_running_statistics() {
    let mut m = model(3);
    let xs = Tensor::randn([8, 128, 3, 4], kind::FLOAT_CPU) * 2.0 + 1.0;
    let before = m.predict(&xs).unwrap();

    let _ = xs.apply_t(m.network(), true);
    assert!(m.predict(&xs).unwrap().equal(&before));

    m.forward_train(&xs).unwrap();
    assert!(!m.predict(&xs).unwrap().equal(&before));
}
