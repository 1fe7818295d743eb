use librunpod::{
    image::{sibling_output, split_images, Format},
    prelude::{Edit, Generation, ImageInput},
    Client,
};

fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&13u32.to_be_bytes());
    bytes.extend_from_slice(b"IHDR");
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&[0x08, 0x06, 0x00, 0x00, 0x00]);
    return bytes;
}

#[tokio::test]
async fn load_local() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cat.PNG");
    std::fs::write(&path, png_header(320, 240))?;

    let image = ImageInput::load(path.display().to_string()).await?;
    let ImageInput::Local(local) = &image else {
        panic!("expected a local image, got {image:?}");
    };

    assert_eq!(local.format, Format::Png);
    assert_eq!(local.extension, "png");
    assert_eq!(local.size.pair(), Some((320, 240)));
    assert!(local.data_uri.starts_with("data:image/png;base64,iVBORw0KGgo"));
    assert_eq!(image.redacted(), "[data]");
    assert_eq!(image.size().and_then(|x| x.pair()), Some((320, 240)));

    assert_eq!(
        sibling_output(Some(&image), ".png")?,
        dir.path().join("cat-.png")
    );
    return Ok(());
}

#[tokio::test]
async fn load_passthrough() -> anyhow::Result<()> {
    let images = ImageInput::load_all(split_images(
        " https://example.com/a.webp , ,data:image/jpeg;base64,AAAA",
    ))
    .await?;

    assert_eq!(
        images,
        vec![
            ImageInput::Remote("https://example.com/a.webp".into()),
            ImageInput::Remote("data:image/jpeg;base64,AAAA".into()),
        ]
    );
    assert_eq!(images[0].extension().as_deref(), Some("webp"));
    assert_eq!(images[0].size(), None);
    assert_eq!(images[1].redacted(), "[data]");
    return Ok(());
}

#[tokio::test]
async fn load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.jpg");

    let err = ImageInput::load(path.display().to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, librunpod::error::Error::Io(_)));
}

#[tokio::test]
async fn undetermined_dimensions() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.webp");
    std::fs::write(&path, b"RIFF\0\0\0\0WEBPVP8L")?;

    let image = ImageInput::load(path.display().to_string()).await?;
    assert!(image.size().is_some_and(|x| x.is_empty()));
    return Ok(());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "submits a job to RunPod"]
async fn edit() -> anyhow::Result<()> {
    dotenv::dotenv()?;
    let client = Client::new(None, None)?;

    let images = vec![ImageInput::load("https://picsum.photos/id/237/512/512.jpg").await?];
    let result = Edit::new(images, "make it snow", &client).await?;

    println!("{result:?}");
    return Ok(());
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "submits a job to RunPod"]
async fn text_to_image() -> anyhow::Result<()> {
    dotenv::dotenv()?;
    let client = Client::new(None, None)?;

    let result = Generation::new("a lighthouse at dusk", &client).await?;
    assert!(result.output_file.exists());

    println!("{result:?}");
    return Ok(());
}
